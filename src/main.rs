//! Threshold grid search CLI for in-game win-probability trading research.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use courtside::application::search::engine::SearchEngine;
use courtside::application::search::reporting::SearchReporter;
use courtside::config::{FeeConfig, SearchConfig};
use courtside::domain::grid::GridSpec;
use courtside::domain::ports::SnapshotStore;
use courtside::domain::split::split_games;
use courtside::infrastructure::cache::results_cache::ResultsCache;
use courtside::infrastructure::persistence::database::Database;
use courtside::infrastructure::persistence::snapshot_repository::SqliteSnapshotStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "In-game win-probability threshold search", long_about = None)]
struct Cli {
    /// Database URL (falls back to DATABASE_URL, then a local default)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct UniverseArgs {
    /// Season to search, e.g. 2023-24
    #[arg(short, long)]
    season: Option<String>,

    /// Comma-separated explicit game ids (overrides --season)
    #[arg(short, long)]
    games: Option<String>,

    /// Shuffle seed for the train/valid/test split
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Fraction of games assigned to the train split
    #[arg(long, default_value = "0.6")]
    train_ratio: f64,

    /// Fraction of games assigned to the validation split
    #[arg(long, default_value = "0.2")]
    valid_ratio: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full grid search with train -> validate selection
    Run {
        #[command(flatten)]
        universe: UniverseArgs,

        /// TOML file with threshold grid bounds (overrides the grid flags)
        #[arg(long)]
        grid_config: Option<String>,

        #[arg(long, default_value = "0.02")]
        entry_min: f64,
        #[arg(long, default_value = "0.10")]
        entry_max: f64,
        #[arg(long, default_value = "0.01")]
        entry_step: f64,
        #[arg(long, default_value = "0.00")]
        exit_min: f64,
        #[arg(long, default_value = "0.05")]
        exit_max: f64,
        #[arg(long, default_value = "0.01")]
        exit_step: f64,

        /// Model artifact JSON; omit to trade the raw signal
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Number of top train results eligible for validation selection
        #[arg(short, long, default_value = "10")]
        top_n: usize,

        /// Minimum train-split trades for a grid point to be selectable
        #[arg(long, default_value = "30")]
        min_trades: usize,

        /// Seconds after tip-off to exclude
        #[arg(long, default_value = "300")]
        exclude_first: f64,

        /// Regulation seconds before the end to exclude
        #[arg(long, default_value = "120")]
        exclude_last: f64,

        /// Contract face value per trade in dollars
        #[arg(long, default_value = "100")]
        notional: f64,

        /// Simulate frictionless fills (no exchange fees)
        #[arg(long)]
        no_fees: bool,

        /// Exchange fee rate for the convex fee curve
        #[arg(long, default_value = "0.07")]
        fee_rate: f64,

        /// Fee rounding increment in dollars
        #[arg(long, default_value = "0.01")]
        fee_increment: f64,

        /// Slippage rate charged against notional per leg
        #[arg(long, default_value = "0.0")]
        slippage: f64,

        /// Worker threads for the grid phase (0 = all cores)
        #[arg(short, long, default_value = "0")]
        workers: usize,

        /// Output root; each run lands in <output>/<cache-key>/
        #[arg(short, long, default_value = "runs")]
        output: PathBuf,

        /// Recompute even when a cached run exists
        #[arg(long)]
        no_cache: bool,
    },
    /// Print the deterministic train/valid/test split without searching
    Splits {
        #[command(flatten)]
        universe: UniverseArgs,
    },
    /// List the game ids available for a season
    Games {
        /// Season to list, e.g. 2023-24
        #[arg(short, long)]
        season: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let db_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://data/snapshots.db".to_string());

    let database = Database::new(&db_url).await?;
    let store: Arc<dyn SnapshotStore> = Arc::new(SqliteSnapshotStore::new(database.pool.clone()));

    match cli.command {
        Commands::Run {
            universe,
            grid_config,
            entry_min,
            entry_max,
            entry_step,
            exit_min,
            exit_max,
            exit_step,
            model,
            top_n,
            min_trades,
            exclude_first,
            exclude_last,
            notional,
            no_fees,
            fee_rate,
            fee_increment,
            slippage,
            workers,
            output,
            no_cache,
        } => {
            let grid = match grid_config {
                Some(path) => {
                    info!("Loading grid bounds from {}", path);
                    load_grid_from_toml(&path)?
                }
                None => GridSpec {
                    entry_min,
                    entry_max,
                    entry_step,
                    exit_min,
                    exit_max,
                    exit_step,
                },
            };

            let config = SearchConfig {
                season: universe.season,
                games: parse_game_list(universe.games.as_deref()),
                grid,
                model_path: model,
                seed: universe.seed,
                train_ratio: universe.train_ratio,
                valid_ratio: universe.valid_ratio,
                top_n,
                min_trades,
                exclude_first_seconds: exclude_first,
                exclude_last_seconds: exclude_last,
                notional,
                fees: FeeConfig {
                    enabled: !no_fees,
                    rate: fee_rate,
                    min_increment: fee_increment,
                    slippage_rate: slippage,
                },
                workers,
                out_dir: output.clone(),
                no_cache,
            };

            let cache = ResultsCache::new(output);
            let engine = SearchEngine::new(store, cache);

            // First Ctrl-C requests a clean stop; the run returns an error
            // and persists nothing.
            let cancel = Arc::new(AtomicBool::new(false));
            let cancel_flag = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling search");
                    cancel_flag.store(true, Ordering::Relaxed);
                }
            });

            let outcome = engine.run(&config, &cancel).await?;

            SearchReporter::print_header(&outcome.artifact);
            SearchReporter::print_results_table(&outcome.artifact);
            SearchReporter::print_selection(&outcome.artifact);

            if outcome.from_cache {
                println!("(served from cache)");
            } else {
                let dir = ResultsCache::new(outcome.artifact.config.out_dir.clone())
                    .entry_dir(&outcome.artifact.cache_key);
                SearchReporter::export(&dir, &outcome.artifact)?;
                println!("Results written to {}", dir.display());
            }
        }
        Commands::Splits { universe } => {
            let ids = match (parse_game_list(universe.games.as_deref()), &universe.season) {
                (Some(games), _) => games,
                (None, Some(season)) => store.list_games(season).await?,
                (None, None) => anyhow::bail!("Provide --season or --games"),
            };
            let assignment =
                split_games(&ids, universe.seed, universe.train_ratio, universe.valid_ratio);
            println!(
                "Seed {}: {} train / {} valid / {} test",
                assignment.seed,
                assignment.train.len(),
                assignment.valid.len(),
                assignment.test.len()
            );
            for (name, games) in [
                ("train", &assignment.train),
                ("valid", &assignment.valid),
                ("test", &assignment.test),
            ] {
                println!("[{}]", name);
                for id in games {
                    println!("  {}", id);
                }
            }
        }
        Commands::Games { season } => {
            let games = store.list_games(&season).await?;
            println!("{} games in season {}:", games.len(), season);
            for id in &games {
                println!("  {}", id);
            }
        }
    }

    Ok(())
}

fn parse_game_list(games: Option<&str>) -> Option<Vec<String>> {
    let list: Vec<String> = games?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!list.is_empty()).then_some(list)
}

/// Loads threshold grid bounds from a TOML file.
fn load_grid_from_toml(path: &str) -> Result<GridSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read grid config file: {}", path))?;
    let grid: GridSpec =
        toml::from_str(&content).with_context(|| format!("Failed to parse grid config TOML: {}", path))?;
    Ok(grid)
}
