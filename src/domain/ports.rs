use crate::domain::ml::feature_registry::FeatureColumns;
use crate::domain::snapshot::GameSnapshots;
use anyhow::Result;
use async_trait::async_trait;

// Need async_trait for async functions in traits
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// All game ids of a season, sorted ascending.
    async fn list_games(&self, season: &str) -> Result<Vec<String>>;

    /// All snapshots of one game in sequence order, fetching only the
    /// optional columns named by `columns`. Returns `None` for an unknown
    /// game or a game with no market data at all.
    async fn load_game(&self, game_id: &str, columns: FeatureColumns)
        -> Result<Option<GameSnapshots>>;
}
