use crate::domain::grid::GridPoint;
use crate::domain::performance::metrics::StrategyMetrics;
use serde::{Deserialize, Serialize};

/// Aggregate metrics of one grid point on one split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridResult {
    pub point: GridPoint,
    pub metrics: StrategyMetrics,
}

/// The chosen grid point with its metrics on all three splits. Test numbers
/// are informational only; they never influenced the choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionReport {
    pub point: GridPoint,
    pub train: StrategyMetrics,
    pub valid: StrategyMetrics,
    pub test: StrategyMetrics,
}

/// Train -> validate selection protocol, independent of how the results were
/// produced.
///
/// Rank train results by net profit (descending, stable on grid order),
/// keeping only points whose train trade count met the validity floor; take
/// the top `top_n`; among those, return the point with the best
/// validation-split net profit. A candidate without a validation row cannot
/// be assessed and is skipped. Test results are deliberately not an input:
/// the held-out estimate stays honest by construction.
pub fn select(train: &[GridResult], valid: &[GridResult], top_n: usize) -> Option<GridPoint> {
    let mut candidates: Vec<&GridResult> = train.iter().filter(|r| r.metrics.valid).collect();
    // Stable sort keeps grid order as the tie-break, so selection is
    // deterministic for identical inputs.
    candidates.sort_by(|a, b| {
        b.metrics
            .net_profit
            .partial_cmp(&a.metrics.net_profit)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_n);

    let mut best: Option<(GridPoint, f64)> = None;
    for candidate in candidates {
        let Some(valid_net) = valid
            .iter()
            .find(|r| r.point == candidate.point)
            .map(|r| r.metrics.net_profit)
        else {
            continue;
        };
        match best {
            Some((_, incumbent)) if valid_net <= incumbent => {}
            _ => best = Some((candidate.point, valid_net)),
        }
    }
    best.map(|(point, _)| point)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(entry: f64, exit: f64, net: f64, trades: usize, valid: bool) -> GridResult {
        GridResult {
            point: GridPoint { entry, exit },
            metrics: StrategyMetrics {
                games: 10,
                trades,
                net_profit: net,
                valid,
                ..StrategyMetrics::default()
            },
        }
    }

    #[test]
    fn test_picks_best_validation_among_top_train() {
        let train = vec![
            result(0.02, 0.00, 100.0, 50, true),
            result(0.03, 0.00, 90.0, 40, true),
            result(0.04, 0.00, 80.0, 30, true),
        ];
        // Best train point degrades on validation; second-best holds up.
        let valid = vec![
            result(0.02, 0.00, -20.0, 45, true),
            result(0.03, 0.00, 60.0, 38, true),
            result(0.04, 0.00, 10.0, 28, true),
        ];
        let chosen = select(&train, &valid, 3).unwrap();
        assert_eq!(chosen, GridPoint { entry: 0.03, exit: 0.00 });
    }

    #[test]
    fn test_top_n_limits_validation_candidates() {
        let train = vec![
            result(0.02, 0.00, 100.0, 50, true),
            result(0.03, 0.00, 90.0, 40, true),
            result(0.04, 0.00, 10.0, 30, true),
        ];
        // The third point wins validation by a mile but sits outside top-2.
        let valid = vec![
            result(0.02, 0.00, 5.0, 45, true),
            result(0.03, 0.00, 4.0, 38, true),
            result(0.04, 0.00, 500.0, 28, true),
        ];
        let chosen = select(&train, &valid, 2).unwrap();
        assert_eq!(chosen, GridPoint { entry: 0.02, exit: 0.00 });
    }

    #[test]
    fn test_invalid_train_points_are_excluded() {
        let train = vec![
            result(0.02, 0.00, 500.0, 3, false), // huge profit, too few trades
            result(0.03, 0.00, 50.0, 40, true),
        ];
        let valid = vec![
            result(0.02, 0.00, 400.0, 3, true),
            result(0.03, 0.00, 20.0, 38, true),
        ];
        let chosen = select(&train, &valid, 5).unwrap();
        assert_eq!(chosen, GridPoint { entry: 0.03, exit: 0.00 });
    }

    #[test]
    fn test_candidate_without_validation_row_is_skipped() {
        let train = vec![
            result(0.02, 0.00, 100.0, 50, true),
            result(0.03, 0.00, 90.0, 40, true),
        ];
        // The best train point has no validation counterpart; the next one
        // must still be considered.
        let valid = vec![result(0.03, 0.00, 12.0, 38, true)];
        let chosen = select(&train, &valid, 5).unwrap();
        assert_eq!(chosen, GridPoint { entry: 0.03, exit: 0.00 });
    }

    #[test]
    fn test_no_valid_candidates_yields_none() {
        let train = vec![result(0.02, 0.00, 100.0, 2, false)];
        let valid = vec![result(0.02, 0.00, 100.0, 2, true)];
        assert_eq!(select(&train, &valid, 5), None);
    }

    #[test]
    fn test_tie_break_is_stable_on_grid_order() {
        let train = vec![
            result(0.02, 0.00, 50.0, 40, true),
            result(0.03, 0.00, 50.0, 40, true),
        ];
        let valid = vec![
            result(0.02, 0.00, 10.0, 40, true),
            result(0.03, 0.00, 10.0, 40, true),
        ];
        // Equal everywhere: the earlier grid point wins.
        let chosen = select(&train, &valid, 2).unwrap();
        assert_eq!(chosen, GridPoint { entry: 0.02, exit: 0.00 });
    }
}
