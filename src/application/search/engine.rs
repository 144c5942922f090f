use crate::application::ml::model::LoadedModel;
use crate::application::ml::probability_source::ProbabilitySource;
use crate::application::search::selection::{select, GridResult, SelectionReport};
use crate::application::simulation::loader::AlignedLoader;
use crate::application::simulation::simulator::{simulate_game, TradeCosts};
use crate::config::SearchConfig;
use crate::domain::grid::GridPoint;
use crate::domain::performance::metrics::StrategyMetrics;
use crate::domain::ports::SnapshotStore;
use crate::domain::snapshot::AlignedRecord;
use crate::domain::split::{split_games, Split, SplitAssignment};
use crate::domain::trading::trade::Trade;
use crate::infrastructure::cache::results_cache::ResultsCache;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-split result vectors, all in grid order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitResults {
    pub train: Vec<GridResult>,
    pub valid: Vec<GridResult>,
    pub test: Vec<GridResult>,
}

impl SplitResults {
    pub fn results(&self, split: Split) -> &[GridResult] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }
}

/// Complete machine-readable record of one search run. This is what the
/// results cache stores and returns; everything a report needs is in here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    pub cache_key: String,
    pub created_at: DateTime<Utc>,
    pub config: SearchConfig,
    pub probability_source: String,
    pub grid_points: usize,
    pub splits: SplitAssignment,
    /// Games that could not be simulated and were skipped with a warning.
    pub skipped_games: Vec<String>,
    pub results: SplitResults,
    pub selection: Option<SelectionReport>,
}

pub struct SearchOutcome {
    pub from_cache: bool,
    pub artifact: RunArtifact,
}

/// Orchestrates a full grid search: resolve the game universe, split it,
/// preload and score every game once, evaluate the threshold grid in
/// parallel, then run the train -> validate selection protocol.
pub struct SearchEngine {
    store: Arc<dyn SnapshotStore>,
    cache: ResultsCache,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn SnapshotStore>, cache: ResultsCache) -> Self {
        Self { store, cache }
    }

    pub async fn run(&self, config: &SearchConfig, cancel: &AtomicBool) -> Result<SearchOutcome> {
        config.validate().context("Invalid search configuration")?;
        let cache_key = config.cache_key()?;

        if !config.no_cache {
            if let Some(artifact) = self.cache.get(&cache_key) {
                info!("Cache hit for key {}, returning stored results", cache_key);
                return Ok(SearchOutcome {
                    from_cache: true,
                    artifact,
                });
            }
        }

        // The model is loaded exactly once per run and shared read-only by
        // every worker. A broken artifact is fatal here, before any data
        // work starts.
        let source = match &config.model_path {
            None => ProbabilitySource::RawSignal,
            Some(path) => {
                let model = LoadedModel::load(path)?;
                info!("Loaded model {}", model.identity());
                ProbabilitySource::Model(Arc::new(model))
            }
        };

        let universe = self.resolve_universe(config).await?;
        if universe.is_empty() {
            bail!("Game universe is empty; nothing to search");
        }
        let splits = split_games(&universe, config.seed, config.train_ratio, config.valid_ratio);
        info!(
            "Universe of {} games split {}/{}/{} (seed {})",
            splits.total(),
            splits.train.len(),
            splits.valid.len(),
            splits.test.len(),
            config.seed
        );

        let (games, skipped_games) = self.preload(config, &source, &splits, cancel).await?;
        if games.is_empty() {
            bail!("No simulatable games after loading; cannot search");
        }

        let grid = config.grid.generate();
        info!(
            "Evaluating {} grid points over {} games ({})",
            grid.len(),
            games.len(),
            config.grid.describe()
        );

        let results = evaluate_grid(config, &grid, &games, &splits, cancel)?;

        let chosen = select(&results.train, &results.valid, config.top_n);
        let selection = chosen.map(|point| build_report(point, &results));
        match &selection {
            Some(report) => info!(
                "Selected {} (train net {:.2}, valid net {:.2}, test net {:.2})",
                report.point.label(),
                report.train.net_profit,
                report.valid.net_profit,
                report.test.net_profit
            ),
            None => warn!(
                "No grid point met the {}-trade validity floor; nothing selected",
                config.min_trades
            ),
        }

        let artifact = RunArtifact {
            cache_key: cache_key.clone(),
            created_at: Utc::now(),
            config: config.clone(),
            probability_source: source.describe(),
            grid_points: grid.len(),
            splits,
            skipped_games,
            results,
            selection,
        };
        self.cache.put(&artifact)?;

        Ok(SearchOutcome {
            from_cache: false,
            artifact,
        })
    }

    async fn resolve_universe(&self, config: &SearchConfig) -> Result<Vec<String>> {
        match (&config.games, &config.season) {
            (Some(games), _) if !games.is_empty() => Ok(games.clone()),
            (_, Some(season)) => {
                let games = self
                    .store
                    .list_games(season)
                    .await
                    .with_context(|| format!("Failed to list games for season {}", season))?;
                info!("Season {} has {} games", season, games.len());
                Ok(games)
            }
            _ => bail!("No game universe configured"),
        }
    }

    /// Load and score every game once, before the grid phase. Scoring does
    /// not depend on thresholds, so the aligned records are computed here
    /// and shared read-only across all grid points.
    async fn preload(
        &self,
        config: &SearchConfig,
        source: &ProbabilitySource,
        splits: &SplitAssignment,
        cancel: &AtomicBool,
    ) -> Result<(BTreeMap<String, Vec<AlignedRecord>>, Vec<String>)> {
        let loader = AlignedLoader::new(
            Arc::clone(&self.store),
            source.clone(),
            config.exclude_first_seconds,
            config.exclude_last_seconds,
        );

        let mut games = BTreeMap::new();
        let mut skipped = Vec::new();
        for split in Split::ALL {
            for game_id in splits.games(split) {
                if cancel.load(Ordering::Relaxed) {
                    bail!("Search cancelled during game loading");
                }
                match loader.load_game(game_id).await {
                    Ok(Some(loaded)) => {
                        games.insert(loaded.game_id, loaded.records);
                    }
                    Ok(None) => {
                        warn!("Game {}: no simulatable records, skipping", game_id);
                        skipped.push(game_id.clone());
                    }
                    Err(e) => {
                        warn!("Game {}: load failed ({}), skipping", game_id, e);
                        skipped.push(game_id.clone());
                    }
                }
            }
        }
        info!(
            "Preloaded {} games ({} skipped)",
            games.len(),
            skipped.len()
        );
        Ok((games, skipped))
    }
}

/// Evaluate every grid point against every split in parallel.
///
/// The unit of parallelism is the grid point: each worker walks its point
/// across all three splits, so a point's train/valid/test rows always come
/// from the same pass. Cancellation is cooperative; a cancelled run returns
/// an error and persists nothing.
fn evaluate_grid(
    config: &SearchConfig,
    grid: &[GridPoint],
    games: &BTreeMap<String, Vec<AlignedRecord>>,
    splits: &SplitAssignment,
    cancel: &AtomicBool,
) -> Result<SplitResults> {
    let costs = config.trade_costs();

    let run = || -> Vec<Option<[GridResult; 3]>> {
        grid.par_iter()
            .map(|&point| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let mut row = Split::ALL.map(|split| GridResult {
                    point,
                    metrics: evaluate_point(
                        point,
                        splits.games(split),
                        games,
                        &costs,
                        config.min_trades,
                    ),
                });
                // Selectability is defined by the train split alone; the
                // valid/test rows mirror their train row so the exported
                // tables agree with the selection protocol.
                let selectable = row[0].metrics.valid;
                row[1].metrics.valid = selectable;
                row[2].metrics.valid = selectable;
                Some(row)
            })
            .collect()
    };

    let rows = if config.workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .context("Failed to build worker pool")?;
        pool.install(run)
    } else {
        run()
    };

    let mut results = SplitResults {
        train: Vec::with_capacity(grid.len()),
        valid: Vec::with_capacity(grid.len()),
        test: Vec::with_capacity(grid.len()),
    };
    for row in rows {
        let Some([train, valid, test]) = row else {
            bail!("Search cancelled during grid evaluation");
        };
        results.train.push(train);
        results.valid.push(valid);
        results.test.push(test);
    }
    Ok(results)
}

/// One (grid point, split) evaluation: simulate every loaded game of the
/// split and aggregate the concatenated trades. Split game lists are sorted,
/// so the concatenation order (and drawdown) is reproducible.
fn evaluate_point(
    point: GridPoint,
    split_game_ids: &[String],
    games: &BTreeMap<String, Vec<AlignedRecord>>,
    costs: &TradeCosts,
    min_trades: usize,
) -> StrategyMetrics {
    let mut trades: Vec<Trade> = Vec::new();
    let mut simulated = 0usize;
    for game_id in split_game_ids {
        if let Some(records) = games.get(game_id) {
            trades.extend(simulate_game(records, point, costs));
            simulated += 1;
        }
    }
    StrategyMetrics::from_trades(&trades, simulated, min_trades)
}

fn build_report(point: GridPoint, results: &SplitResults) -> SelectionReport {
    let metrics_for = |rows: &[GridResult]| {
        rows.iter()
            .find(|r| r.point == point)
            .map(|r| r.metrics.clone())
            .unwrap_or_default()
    };
    SelectionReport {
        point,
        train: metrics_for(&results.train),
        valid: metrics_for(&results.valid),
        test: metrics_for(&results.test),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(seq: i64, signal: f64, mid: f64) -> AlignedRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 1, 0, 0).unwrap();
        AlignedRecord {
            seq,
            timestamp: base + Duration::seconds(10 * seq),
            signal_prob: signal,
            bid: mid - 0.01,
            ask: mid + 0.01,
            mid,
        }
    }

    fn divergent_game() -> Vec<AlignedRecord> {
        vec![
            record(0, 0.50, 0.50),
            record(1, 0.70, 0.50),
            record(2, 0.50, 0.50),
            record(3, 0.50, 0.50),
        ]
    }

    #[test]
    fn test_evaluate_point_skips_unloaded_games() {
        let mut games = BTreeMap::new();
        games.insert("g1".to_string(), divergent_game());

        let ids = vec!["g1".to_string(), "g_missing".to_string()];
        let metrics = evaluate_point(
            GridPoint { entry: 0.15, exit: 0.02 },
            &ids,
            &games,
            &TradeCosts::frictionless(100.0),
            1,
        );
        assert_eq!(metrics.games, 1);
        assert_eq!(metrics.trades, 1);
    }

    #[test]
    fn test_evaluate_grid_is_grid_ordered_and_cancellable() {
        let mut games = BTreeMap::new();
        games.insert("g1".to_string(), divergent_game());
        let splits = SplitAssignment {
            seed: 1,
            train: vec!["g1".to_string()],
            valid: vec![],
            test: vec![],
        };
        let config = SearchConfig {
            games: Some(vec!["g1".to_string()]),
            min_trades: 0,
            ..SearchConfig::default()
        };
        let grid = config.grid.generate();

        let cancel = AtomicBool::new(false);
        let results = evaluate_grid(&config, &grid, &games, &splits, &cancel).unwrap();
        assert_eq!(results.train.len(), grid.len());
        for (row, point) in results.train.iter().zip(&grid) {
            assert_eq!(row.point, *point);
        }

        cancel.store(true, Ordering::Relaxed);
        let err = evaluate_grid(&config, &grid, &games, &splits, &cancel);
        assert!(err.is_err(), "cancelled evaluation must not return results");
    }

    #[test]
    fn test_validity_flag_mirrors_train_split() {
        let mut games = BTreeMap::new();
        games.insert("g_train".to_string(), divergent_game());
        // Flat market in the validation game: zero trades there.
        games.insert(
            "g_valid".to_string(),
            vec![
                record(0, 0.50, 0.50),
                record(1, 0.50, 0.50),
                record(2, 0.50, 0.50),
            ],
        );
        let splits = SplitAssignment {
            seed: 1,
            train: vec!["g_train".to_string()],
            valid: vec!["g_valid".to_string()],
            test: vec![],
        };
        let config = SearchConfig {
            games: Some(vec!["g_train".to_string(), "g_valid".to_string()]),
            min_trades: 1,
            ..SearchConfig::default()
        };
        let grid = vec![GridPoint { entry: 0.15, exit: 0.02 }];

        let cancel = AtomicBool::new(false);
        let results = evaluate_grid(&config, &grid, &games, &splits, &cancel).unwrap();

        assert!(results.train[0].metrics.valid);
        assert_eq!(results.valid[0].metrics.trades, 0);
        assert!(
            results.valid[0].metrics.valid,
            "validation rows must carry the train row's selectability"
        );
        assert!(results.test[0].metrics.valid);
    }

    #[test]
    fn test_report_carries_all_three_splits() {
        let point = GridPoint { entry: 0.1, exit: 0.0 };
        let row = |net: f64| GridResult {
            point,
            metrics: StrategyMetrics {
                net_profit: net,
                ..StrategyMetrics::default()
            },
        };
        let results = SplitResults {
            train: vec![row(30.0)],
            valid: vec![row(20.0)],
            test: vec![row(10.0)],
        };
        let report = build_report(point, &results);
        assert_eq!(report.train.net_profit, 30.0);
        assert_eq!(report.valid.net_profit, 20.0);
        assert_eq!(report.test.net_profit, 10.0);
    }
}
