use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Read-mostly connection to the snapshot warehouse.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    fs::create_dir_all(parent)
                        .await
                        .context("Failed to create database directory")?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal); // Better for concurrency

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema. The ingestion pipeline owns the data;
    /// this just guarantees the table exists so a fresh database fails with
    /// "no games" instead of a missing-table error.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot_features_v1 (
                game_id TEXT NOT NULL,
                season TEXT NOT NULL,
                seq INTEGER NOT NULL,
                ts INTEGER NOT NULL,
                home_win_prob REAL NOT NULL,
                market_bid REAL,
                market_ask REAL,
                market_mid REAL,
                seconds_remaining REAL NOT NULL,
                point_diff INTEGER NOT NULL,
                period INTEGER NOT NULL,
                prob_lag REAL,
                prob_delta REAL,
                score_time_ratio REAL,
                pregame_fair_prob REAL,
                pregame_overround REAL,
                pregame_spread REAL,
                pregame_total REAL,
                home_won INTEGER,
                PRIMARY KEY (game_id, seq)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create snapshot_features_v1 table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_snapshot_features_season
            ON snapshot_features_v1 (season, game_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create season index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
