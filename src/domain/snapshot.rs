use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Regulation length of an NBA game in seconds (4 x 12 minutes).
pub const REGULATION_SECONDS: f64 = 2880.0;

/// One timestamped observation of a game in progress, as materialized by the
/// canonical snapshot view. Read-only to this crate.
///
/// Optional columns are only populated when the active probability source
/// requires them; the loader leaves them `None` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub game_id: String,
    /// Monotonic per-game sequence number (strict ordering key).
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    /// Raw ESPN home-win probability in [0, 1].
    pub home_win_prob: f64,
    /// Kalshi home-side quotes in [0, 1].
    pub market_bid: f64,
    pub market_ask: f64,
    pub market_mid: f64,
    /// Seconds left on the regulation clock (0 once overtime starts).
    pub seconds_remaining: f64,
    /// Home score minus away score.
    pub point_diff: i32,
    pub period: i32,
    // Lag/delta/interaction columns, present only when selected.
    pub prob_lag: Option<f64>,
    pub prob_delta: Option<f64>,
    pub score_time_ratio: Option<f64>,
    // Pre-game market features, present only when selected.
    pub pregame_fair_prob: Option<f64>,
    pub pregame_overround: Option<f64>,
    pub pregame_spread: Option<f64>,
    pub pregame_total: Option<f64>,
}

impl Snapshot {
    /// Seconds elapsed since tip-off on the regulation clock.
    pub fn elapsed_seconds(&self) -> f64 {
        (REGULATION_SECONDS - self.seconds_remaining).max(0.0)
    }
}

/// One simulator-ready record: the snapshot's market state plus the final
/// signal probability produced by the active probability source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRecord {
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    pub signal_prob: f64,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
}

impl AlignedRecord {
    /// Signed divergence between signal and market mid.
    pub fn divergence(&self) -> f64 {
        self.signal_prob - self.mid
    }
}

/// All snapshots of one game plus its settled outcome (when known).
#[derive(Debug, Clone)]
pub struct GameSnapshots {
    pub snapshots: Vec<Snapshot>,
    pub home_won: Option<bool>,
}

/// Baseline snapshot for unit tests across the crate.
#[cfg(test)]
pub(crate) fn test_snapshot() -> Snapshot {
    Snapshot {
        game_id: "401585601".to_string(),
        seq: 0,
        timestamp: Utc::now(),
        home_win_prob: 0.5,
        market_bid: 0.49,
        market_ask: 0.51,
        market_mid: 0.50,
        seconds_remaining: 2880.0,
        point_diff: 0,
        period: 1,
        prob_lag: None,
        prob_delta: None,
        score_time_ratio: None,
        pregame_fair_prob: None,
        pregame_overround: None,
        pregame_spread: None,
        pregame_total: None,
    }
}
