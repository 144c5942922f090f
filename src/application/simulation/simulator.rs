use crate::domain::grid::GridPoint;
use crate::domain::snapshot::AlignedRecord;
use crate::domain::trading::fee_model::FeeModel;
use crate::domain::trading::trade::{Direction, Trade};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Execution cost assumptions shared by every simulated trade.
#[derive(Debug, Clone)]
pub struct TradeCosts {
    /// No fee model means frictionless fills (fees disabled).
    pub fee_model: Option<Arc<dyn FeeModel>>,
    /// Fixed rate charged against notional on each leg.
    pub slippage_rate: f64,
    /// Fixed position size in dollars of contract face per trade.
    pub notional: f64,
}

impl TradeCosts {
    pub fn frictionless(notional: f64) -> Self {
        Self {
            fee_model: None,
            slippage_rate: 0.0,
            notional,
        }
    }

    fn leg_fee(&self, price: f64) -> f64 {
        self.fee_model
            .as_ref()
            .map(|m| m.fee(price, self.notional))
            .unwrap_or(0.0)
    }

    fn leg_slippage(&self) -> f64 {
        self.slippage_rate * self.notional
    }
}

struct OpenPosition {
    direction: Direction,
    entry_seq: i64,
    entry_time: DateTime<Utc>,
    entry_price: f64,
    entry_divergence: f64,
}

/// Deterministically simulate one game's aligned records against a grid
/// point.
///
/// State machine: FLAT -> LONG -> FLAT or FLAT -> SHORT -> FLAT, at most one
/// open position at any time. Entries buy at the ask / sell at the bid and
/// exits do the reverse, so the spread is always paid. Whatever is still
/// open at the final record is force-closed there; a game never ends with a
/// live position.
pub fn simulate_game(records: &[AlignedRecord], point: GridPoint, costs: &TradeCosts) -> Vec<Trade> {
    let mut trades = Vec::new();
    let mut position: Option<OpenPosition> = None;
    let Some(end_time) = records.last().map(|r| r.timestamp) else {
        return trades;
    };

    for (i, rec) in records.iter().enumerate() {
        let is_last = i + 1 == records.len();
        let divergence = rec.divergence();

        if let Some(open) = position.take() {
            // Timestamps are only non-decreasing; an exit within the same
            // instant as the entry would be a zero-duration trade, so hold
            // until the clock moves.
            let exit_fired = divergence.abs() < point.exit && rec.timestamp > open.entry_time;
            if exit_fired || is_last {
                let exit_price = match open.direction {
                    Direction::Long => rec.bid,
                    Direction::Short => rec.ask,
                };
                trades.push(close_trade(open, rec, exit_price, is_last && !exit_fired, costs));
            } else {
                position = Some(open);
            }
        } else if rec.timestamp < end_time {
            // No entries within the final instant of the game: the forced
            // close would land at the entry's own timestamp.
            if divergence > point.entry {
                position = Some(open_position(Direction::Long, rec, rec.ask, divergence));
            } else if -divergence > point.entry {
                position = Some(open_position(Direction::Short, rec, rec.bid, divergence));
            }
        }
    }

    debug_assert!(position.is_none(), "simulation must end flat");
    trades
}

fn open_position(
    direction: Direction,
    rec: &AlignedRecord,
    price: f64,
    divergence: f64,
) -> OpenPosition {
    OpenPosition {
        direction,
        entry_seq: rec.seq,
        entry_time: rec.timestamp,
        entry_price: price,
        entry_divergence: divergence,
    }
}

fn close_trade(
    open: OpenPosition,
    rec: &AlignedRecord,
    exit_price: f64,
    forced: bool,
    costs: &TradeCosts,
) -> Trade {
    let gross =
        (exit_price - open.entry_price) * open.direction.sign() * costs.notional;
    let fees = costs.leg_fee(open.entry_price) + costs.leg_fee(exit_price);
    let slippage = 2.0 * costs.leg_slippage();
    Trade {
        direction: open.direction,
        entry_seq: open.entry_seq,
        entry_time: open.entry_time,
        entry_price: open.entry_price,
        entry_divergence: open.entry_divergence,
        exit_seq: rec.seq,
        exit_time: rec.timestamp,
        exit_price,
        exit_divergence: rec.divergence(),
        forced_close: forced,
        notional: costs.notional,
        fees,
        slippage,
        gross_profit: gross,
        net_profit: gross - fees - slippage,
    }
}
