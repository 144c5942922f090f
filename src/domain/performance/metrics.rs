use crate::domain::trading::trade::Trade;
use serde::{Deserialize, Serialize};

/// Sentinel for profit factor when there are no losing trades. Kept finite
/// so result tables stay sortable in spreadsheets.
pub const PROFIT_FACTOR_CAP: f64 = 1e9;

/// Aggregate performance of one (grid point, split) evaluation.
///
/// Calculated from the concatenated trade sequence of every game in the
/// split, in sorted game-id order, so drawdown is reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyMetrics {
    /// Games that were simulated (including games with zero trades).
    pub games: usize,
    pub trades: usize,
    pub net_profit: f64,
    pub gross_profit: f64,
    pub total_fees: f64,
    pub total_slippage: f64,
    /// Share of trades with positive net profit, 0 when no trades.
    pub win_rate: f64,
    /// Sum of winning net / |sum of losing net|; PROFIT_FACTOR_CAP when no losers.
    pub profit_factor: f64,
    /// Largest peak-to-trough decline of cumulative net profit (>= 0).
    pub max_drawdown: f64,
    pub avg_hold_seconds: f64,
    /// Whether this row is selectable. `from_trades` derives it from its own
    /// trade count; the search engine overwrites valid/test rows with their
    /// train row's flag, since selectability is a train-split property.
    pub valid: bool,
}

impl StrategyMetrics {
    /// Aggregate a trade sequence into split-level metrics.
    ///
    /// A zero-trade evaluation yields all-zero sums with `games` still
    /// counted; selectivity is a result, not an error.
    pub fn from_trades(trades: &[Trade], games: usize, min_trades: usize) -> Self {
        let mut winning = 0usize;
        let mut win_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut net = 0.0;
        let mut gross = 0.0;
        let mut fees = 0.0;
        let mut slippage = 0.0;
        let mut hold = 0.0;

        let mut peak = 0.0f64;
        let mut max_drawdown = 0.0f64;

        for trade in trades {
            net += trade.net_profit;
            gross += trade.gross_profit;
            fees += trade.fees;
            slippage += trade.slippage;
            hold += trade.hold_seconds();

            if trade.net_profit > 0.0 {
                winning += 1;
                win_sum += trade.net_profit;
            } else {
                loss_sum += -trade.net_profit;
            }

            peak = peak.max(net);
            max_drawdown = max_drawdown.max(peak - net);
        }

        let count = trades.len();
        let win_rate = if count > 0 {
            winning as f64 / count as f64
        } else {
            0.0
        };
        let profit_factor = if loss_sum > 0.0 {
            (win_sum / loss_sum).min(PROFIT_FACTOR_CAP)
        } else if win_sum > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };
        let avg_hold_seconds = if count > 0 { hold / count as f64 } else { 0.0 };

        Self {
            games,
            trades: count,
            net_profit: net,
            gross_profit: gross,
            total_fees: fees,
            total_slippage: slippage,
            win_rate,
            profit_factor,
            max_drawdown,
            avg_hold_seconds,
            valid: count >= min_trades,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::trade::Direction;
    use chrono::{TimeZone, Utc};

    fn trade(net: f64, hold_secs: i64) -> Trade {
        let entry = Utc.with_ymd_and_hms(2024, 1, 15, 1, 0, 0).unwrap();
        Trade {
            direction: Direction::Long,
            entry_seq: 0,
            entry_time: entry,
            entry_price: 0.5,
            entry_divergence: 0.1,
            exit_seq: 1,
            exit_time: entry + chrono::Duration::seconds(hold_secs),
            exit_price: 0.5,
            exit_divergence: 0.0,
            forced_close: false,
            notional: 100.0,
            fees: 0.0,
            slippage: 0.0,
            gross_profit: net,
            net_profit: net,
        }
    }

    #[test]
    fn test_zero_trades_yields_zero_metrics_not_error() {
        let m = StrategyMetrics::from_trades(&[], 12, 5);
        assert_eq!(m.games, 12);
        assert_eq!(m.trades, 0);
        assert_eq!(m.net_profit, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert!(!m.valid);
    }

    #[test]
    fn test_win_rate_and_profit_factor() {
        let trades = vec![trade(10.0, 60), trade(-4.0, 30), trade(6.0, 90)];
        let m = StrategyMetrics::from_trades(&trades, 3, 2);
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.profit_factor - 4.0).abs() < 1e-12); // 16 / 4
        assert!((m.avg_hold_seconds - 60.0).abs() < 1e-12);
        assert!(m.valid);
    }

    #[test]
    fn test_profit_factor_sentinel_when_no_losers() {
        let m = StrategyMetrics::from_trades(&[trade(5.0, 10)], 1, 0);
        assert_eq!(m.profit_factor, PROFIT_FACTOR_CAP);
    }

    #[test]
    fn test_max_drawdown_peak_to_trough() {
        // Cumulative: 10, 4, 12, 3 -> worst decline is 12 -> 3 = 9.
        let trades = vec![
            trade(10.0, 1),
            trade(-6.0, 1),
            trade(8.0, 1),
            trade(-9.0, 1),
        ];
        let m = StrategyMetrics::from_trades(&trades, 1, 0);
        assert!((m.max_drawdown - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_from_initial_zero() {
        // A losing start draws down from the zero starting equity.
        let m = StrategyMetrics::from_trades(&[trade(-7.0, 1)], 1, 0);
        assert!((m.max_drawdown - 7.0).abs() < 1e-12);
    }
}
