use crate::domain::ml::feature_registry::FeatureColumns;
use crate::domain::ports::SnapshotStore;
use crate::domain::snapshot::{GameSnapshots, Snapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{Row, SqlitePool};

/// Snapshot warehouse access over the `snapshot_features_v1` table.
///
/// Optional feature columns are only added to the SELECT when the active
/// probability source declared a need for them; a raw-signal run never
/// touches them.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn select_sql(columns: FeatureColumns) -> String {
        let mut cols = vec![
            "seq",
            "ts",
            "home_win_prob",
            "market_bid",
            "market_ask",
            "market_mid",
            "seconds_remaining",
            "point_diff",
            "period",
            "home_won",
        ];
        if columns.lag {
            cols.push("prob_lag");
        }
        if columns.delta {
            cols.push("prob_delta");
        }
        if columns.interaction {
            cols.push("score_time_ratio");
        }
        if columns.pregame {
            cols.push("pregame_fair_prob");
            cols.push("pregame_overround");
            cols.push("pregame_spread");
            cols.push("pregame_total");
        }
        // Rows without a full market quote are useless to the simulator and
        // are filtered here rather than in Rust.
        format!(
            "SELECT {} FROM snapshot_features_v1 \
             WHERE game_id = ? \
             AND market_bid IS NOT NULL AND market_ask IS NOT NULL AND market_mid IS NOT NULL \
             ORDER BY seq ASC",
            cols.join(", ")
        )
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn list_games(&self, season: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT game_id FROM snapshot_features_v1 WHERE season = ? ORDER BY game_id ASC",
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list games for season {}", season))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("game_id").map_err(Into::into))
            .collect()
    }

    async fn load_game(
        &self,
        game_id: &str,
        columns: FeatureColumns,
    ) -> Result<Option<GameSnapshots>> {
        let rows = sqlx::query(&Self::select_sql(columns))
            .bind(game_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to load snapshots for game {}", game_id))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let home_won: Option<bool> = rows[0]
            .try_get::<Option<i64>, _>("home_won")?
            .map(|v| v != 0);

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            let ts: i64 = row.try_get("ts")?;
            let timestamp = Utc
                .timestamp_opt(ts, 0)
                .single()
                .with_context(|| format!("Game {}: invalid timestamp {}", game_id, ts))?;

            snapshots.push(Snapshot {
                game_id: game_id.to_string(),
                seq: row.try_get("seq")?,
                timestamp,
                home_win_prob: row.try_get("home_win_prob")?,
                market_bid: row.try_get("market_bid")?,
                market_ask: row.try_get("market_ask")?,
                market_mid: row.try_get("market_mid")?,
                seconds_remaining: row.try_get("seconds_remaining")?,
                point_diff: row.try_get::<i64, _>("point_diff")? as i32,
                period: row.try_get::<i64, _>("period")? as i32,
                prob_lag: if columns.lag {
                    row.try_get("prob_lag")?
                } else {
                    None
                },
                prob_delta: if columns.delta {
                    row.try_get("prob_delta")?
                } else {
                    None
                },
                score_time_ratio: if columns.interaction {
                    row.try_get("score_time_ratio")?
                } else {
                    None
                },
                pregame_fair_prob: if columns.pregame {
                    row.try_get("pregame_fair_prob")?
                } else {
                    None
                },
                pregame_overround: if columns.pregame {
                    row.try_get("pregame_overround")?
                } else {
                    None
                },
                pregame_spread: if columns.pregame {
                    row.try_get("pregame_spread")?
                } else {
                    None
                },
                pregame_total: if columns.pregame {
                    row.try_get("pregame_total")?
                } else {
                    None
                },
            });
        }

        Ok(Some(GameSnapshots {
            snapshots,
            home_won,
        }))
    }
}
