use crate::application::search::engine::RunArtifact;
use crate::application::search::selection::{GridResult, SelectionReport};
use crate::config::SearchConfig;
use crate::domain::performance::metrics::StrategyMetrics;
use crate::domain::split::Split;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// The audit-friendly selection document: the chosen point with its metrics
/// on all three splits, plus enough run metadata to reproduce it.
#[derive(Serialize)]
struct SelectionDocument<'a> {
    cache_key: &'a str,
    created_at: DateTime<Utc>,
    config: &'a SearchConfig,
    probability_source: &'a str,
    search_space: String,
    grid_points: usize,
    game_counts: GameCounts,
    selection: &'a Option<SelectionReport>,
}

#[derive(Serialize)]
struct GameCounts {
    train: usize,
    valid: usize,
    test: usize,
    skipped: usize,
}

/// Console and file output for a finished search run. The console side is
/// human-oriented; the exported CSVs are the spreadsheet-friendly companions
/// to the cached `run.json`.
pub struct SearchReporter;

impl SearchReporter {
    pub fn print_header(artifact: &RunArtifact) {
        println!();
        println!("=== Threshold grid search ===");
        println!("Cache key:    {}", artifact.cache_key);
        println!("Source:       {}", artifact.probability_source);
        println!("Grid:         {} points ({})", artifact.grid_points, artifact.config.grid.describe());
        println!(
            "Games:        {} train / {} valid / {} test (seed {})",
            artifact.splits.train.len(),
            artifact.splits.valid.len(),
            artifact.splits.test.len(),
            artifact.splits.seed
        );
        if !artifact.skipped_games.is_empty() {
            println!("Skipped:      {} games without simulatable data", artifact.skipped_games.len());
        }
        println!();
    }

    /// Top rows of the train table, ranked the same way selection ranks them.
    pub fn print_results_table(artifact: &RunArtifact) {
        let mut rows: Vec<&GridResult> = artifact
            .results
            .train
            .iter()
            .filter(|r| r.metrics.valid)
            .collect();
        rows.sort_by(|a, b| {
            b.metrics
                .net_profit
                .partial_cmp(&a.metrics.net_profit)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(artifact.config.top_n);

        println!(
            "Top {} grid points by train net profit (of {} valid):",
            rows.len(),
            artifact.results.train.iter().filter(|r| r.metrics.valid).count()
        );
        println!(
            "{:<8} {:<8} {:>8} {:>12} {:>9} {:>8} {:>12}",
            "entry", "exit", "trades", "net", "win%", "pf", "max dd"
        );
        for row in rows {
            let m = &row.metrics;
            println!(
                "{:<8.4} {:<8.4} {:>8} {:>12.2} {:>8.1}% {:>8.2} {:>12.2}",
                row.point.entry,
                row.point.exit,
                m.trades,
                m.net_profit,
                m.win_rate * 100.0,
                m.profit_factor,
                m.max_drawdown
            );
        }
        println!();
    }

    pub fn print_selection(artifact: &RunArtifact) {
        match &artifact.selection {
            None => println!("No grid point selected (validity floor not met)."),
            Some(report) => {
                println!("Selected: {}", report.point.label());
                for (name, m) in [
                    ("train", &report.train),
                    ("valid", &report.valid),
                    ("test", &report.test),
                ] {
                    println!(
                        "  {:<6} net {:>10.2}  trades {:>5}  win {:>5.1}%  pf {:>7.2}  dd {:>8.2}  hold {:>6.0}s",
                        name,
                        m.net_profit,
                        m.trades,
                        m.win_rate * 100.0,
                        m.profit_factor,
                        m.max_drawdown,
                        m.avg_hold_seconds
                    );
                }
            }
        }
        println!();
    }

    /// Write the CSV/JSON companions next to `run.json`. Called only after a
    /// fresh compute; a cache hit leaves the original files byte-identical.
    pub fn export(dir: &Path, artifact: &RunArtifact) -> Result<()> {
        for split in Split::ALL {
            let path = dir.join(format!("{}.csv", split.as_str()));
            write_split_csv(&path, artifact.results.results(split))?;
        }

        let document = SelectionDocument {
            cache_key: &artifact.cache_key,
            created_at: artifact.created_at,
            config: &artifact.config,
            probability_source: &artifact.probability_source,
            search_space: artifact.config.grid.describe(),
            grid_points: artifact.grid_points,
            game_counts: GameCounts {
                train: artifact.splits.train.len(),
                valid: artifact.splits.valid.len(),
                test: artifact.splits.test.len(),
                skipped: artifact.skipped_games.len(),
            },
            selection: &artifact.selection,
        };
        let selection_path = dir.join("selection.json");
        let selection_json = serde_json::to_string_pretty(&document)?;
        std::fs::write(&selection_path, selection_json)
            .with_context(|| format!("Failed to write {}", selection_path.display()))?;

        let splits_path = dir.join("splits.json");
        let splits_json = serde_json::to_string_pretty(&artifact.splits)?;
        std::fs::write(&splits_path, splits_json)
            .with_context(|| format!("Failed to write {}", splits_path.display()))?;

        info!("Exported results to {}", dir.display());
        Ok(())
    }
}

fn write_split_csv(path: &Path, results: &[GridResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([
        "entry",
        "exit",
        "games",
        "trades",
        "net_profit",
        "gross_profit",
        "total_fees",
        "total_slippage",
        "win_rate",
        "profit_factor",
        "max_drawdown",
        "avg_hold_seconds",
        "valid",
    ])?;
    for row in results {
        let m: &StrategyMetrics = &row.metrics;
        writer.write_record([
            format!("{:.4}", row.point.entry),
            format!("{:.4}", row.point.exit),
            m.games.to_string(),
            m.trades.to_string(),
            format!("{:.6}", m.net_profit),
            format!("{:.6}", m.gross_profit),
            format!("{:.6}", m.total_fees),
            format!("{:.6}", m.total_slippage),
            format!("{:.6}", m.win_rate),
            format!("{:.6}", m.profit_factor),
            format!("{:.6}", m.max_drawdown),
            format!("{:.3}", m.avg_hold_seconds),
            m.valid.to_string(),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grid::GridPoint;

    fn result(entry: f64, net: f64) -> GridResult {
        GridResult {
            point: GridPoint { entry, exit: 0.0 },
            metrics: StrategyMetrics {
                games: 5,
                trades: 12,
                net_profit: net,
                valid: true,
                ..StrategyMetrics::default()
            },
        }
    }

    #[test]
    fn test_split_csv_round_trips_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("reporting_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("train.csv");

        write_split_csv(&path, &[result(0.02, 10.5), result(0.03, -3.25)]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "entry");
        assert_eq!(&headers[4], "net_profit");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "0.0200");
        assert_eq!(&rows[1][4], "-3.250000");

        std::fs::remove_dir_all(&dir).ok();
    }
}
