use crate::application::ml::probability_source::ProbabilitySource;
use crate::domain::ports::SnapshotStore;
use crate::domain::snapshot::{AlignedRecord, Snapshot};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// One game ready for simulation.
#[derive(Debug, Clone)]
pub struct LoadedGame {
    pub game_id: String,
    pub records: Vec<AlignedRecord>,
    pub game_start: DateTime<Utc>,
    pub duration_seconds: f64,
    pub home_won: Option<bool>,
}

/// Builds the time-ordered record sequence the simulator consumes: fetch the
/// game's snapshots (only the optional columns the probability source
/// needs), trim the unreliable head/tail windows, then score each retained
/// snapshot.
pub struct AlignedLoader {
    store: Arc<dyn SnapshotStore>,
    source: ProbabilitySource,
    exclude_first_seconds: f64,
    exclude_last_seconds: f64,
}

impl AlignedLoader {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        source: ProbabilitySource,
        exclude_first_seconds: f64,
        exclude_last_seconds: f64,
    ) -> Self {
        Self {
            store,
            source,
            exclude_first_seconds,
            exclude_last_seconds,
        }
    }

    /// Load one game. `Ok(None)` means the game cannot be simulated (unknown
    /// id, no market data, or fewer than two tradable records after
    /// trimming) and should be skipped with a warning by the caller.
    pub async fn load_game(&self, game_id: &str) -> Result<Option<LoadedGame>> {
        let Some(game) = self.store.load_game(game_id, self.source.columns()).await? else {
            return Ok(None);
        };
        if game.snapshots.is_empty() {
            return Ok(None);
        }

        let game_start = game.snapshots[0].timestamp;
        let game_end = game.snapshots[game.snapshots.len() - 1].timestamp;
        let duration_seconds = (game_end - game_start).num_milliseconds() as f64 / 1000.0;

        let records = align(
            &game.snapshots,
            &self.source,
            self.exclude_first_seconds,
            self.exclude_last_seconds,
        );
        if records.len() < 2 {
            debug!(
                "Game {}: only {} records after exclusion windows, skipping",
                game_id,
                records.len()
            );
            return Ok(None);
        }

        Ok(Some(LoadedGame {
            game_id: game_id.to_string(),
            records,
            game_start,
            duration_seconds,
            home_won: game.home_won,
        }))
    }
}

/// Trim and score a snapshot sequence.
///
/// The head window drops the opening-volatility seconds after tip-off,
/// measured on the regulation game clock. The tail window drops the
/// settlement-artifact seconds before the end, measured on the wall clock
/// against the game's final snapshot: an overtime game keeps its overtime
/// rows until the window before the actual end. Rows with unusable market
/// quotes are dropped outright.
pub fn align(
    snapshots: &[Snapshot],
    source: &ProbabilitySource,
    exclude_first_seconds: f64,
    exclude_last_seconds: f64,
) -> Vec<AlignedRecord> {
    let Some(last) = snapshots.last() else {
        return Vec::new();
    };
    let game_end = last.timestamp;
    snapshots
        .iter()
        .filter(|s| s.elapsed_seconds() >= exclude_first_seconds)
        .filter(|s| seconds_until(game_end, s) >= exclude_last_seconds)
        .filter(|s| quotes_usable(s))
        .map(|s| AlignedRecord {
            seq: s.seq,
            timestamp: s.timestamp,
            signal_prob: source.score(s),
            bid: s.market_bid,
            ask: s.market_ask,
            mid: s.market_mid,
        })
        .collect()
}

fn seconds_until(game_end: DateTime<Utc>, s: &Snapshot) -> f64 {
    (game_end - s.timestamp).num_milliseconds() as f64 / 1000.0
}

fn quotes_usable(s: &Snapshot) -> bool {
    [s.market_bid, s.market_ask, s.market_mid]
        .iter()
        .all(|p| p.is_finite() && (0.0..=1.0).contains(p))
}
