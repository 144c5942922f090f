use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a position in the home-side market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Bought the home contract (signal says the market is too cheap).
    Long,
    /// Sold the home contract (signal says the market is too rich).
    Short,
}

impl Direction {
    /// +1 for long, -1 for short; multiplies price movement into P&L.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

/// A closed open-to-close position in one game. Immutable once built; only
/// aggregated metrics survive past the per-game simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub direction: Direction,
    pub entry_seq: i64,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    /// Signed signal-minus-mid divergence observed at entry.
    pub entry_divergence: f64,
    pub exit_seq: i64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_divergence: f64,
    /// True when the game ended with the position still open.
    pub forced_close: bool,
    pub notional: f64,
    pub fees: f64,
    pub slippage: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
}

impl Trade {
    pub fn hold_seconds(&self) -> f64 {
        (self.exit_time - self.entry_time).num_milliseconds() as f64 / 1000.0
    }
}
