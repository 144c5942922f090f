use crate::application::search::engine::RunArtifact;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const RUN_FILE: &str = "run.json";

/// Content-addressed run store: one directory per cache key under the output
/// root, with `run.json` as the machine artifact the cache reads back. The
/// CSV/JSON companions written next to it are for humans and are never
/// consulted on a hit.
pub struct ResultsCache {
    root: PathBuf,
}

impl ResultsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn entry_dir(&self, cache_key: &str) -> PathBuf {
        self.root.join(cache_key)
    }

    /// Look up a finished run. A missing entry is a plain miss; an entry
    /// that exists but fails to parse (older format, truncated write) is
    /// treated as a miss with a warning so the run recomputes over it.
    pub fn get(&self, cache_key: &str) -> Option<RunArtifact> {
        let path = self.entry_dir(cache_key).join(RUN_FILE);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(_) => return None,
        };
        match serde_json::from_str::<RunArtifact>(&data) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!(
                    "Unreadable cache entry {} ({}), recomputing",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist a finished run, returning its entry directory. Written via a
    /// temp file and rename so a crash mid-write never leaves a truncated
    /// `run.json` behind.
    pub fn put(&self, artifact: &RunArtifact) -> Result<PathBuf> {
        let dir = self.entry_dir(&artifact.cache_key);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;

        let path = dir.join(RUN_FILE);
        let tmp = dir.join(format!("{}.tmp", RUN_FILE));
        let json = serde_json::to_string_pretty(artifact)
            .context("Failed to serialize run artifact")?;
        write_atomic(&tmp, &path, &json)?;

        info!("Cached run {} at {}", artifact.cache_key, path.display());
        Ok(dir)
    }
}

fn write_atomic(tmp: &Path, path: &Path, contents: &str) -> Result<()> {
    fs::write(tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::search::engine::SplitResults;
    use crate::config::SearchConfig;
    use crate::domain::split::SplitAssignment;
    use chrono::Utc;

    fn artifact(key: &str) -> RunArtifact {
        RunArtifact {
            cache_key: key.to_string(),
            created_at: Utc::now(),
            config: SearchConfig {
                season: Some("2023-24".to_string()),
                ..SearchConfig::default()
            },
            probability_source: "espn:raw".to_string(),
            grid_points: 0,
            splits: SplitAssignment {
                seed: 42,
                train: vec!["g1".to_string()],
                valid: vec![],
                test: vec![],
            },
            skipped_games: vec![],
            results: SplitResults {
                train: vec![],
                valid: vec![],
                test: vec![],
            },
            selection: None,
        }
    }

    fn temp_cache(tag: &str) -> ResultsCache {
        let root = std::env::temp_dir().join(format!("results_cache_{}_{}", tag, std::process::id()));
        fs::remove_dir_all(&root).ok();
        ResultsCache::new(root)
    }

    #[test]
    fn test_miss_then_hit_round_trip() {
        let cache = temp_cache("round_trip");
        assert!(cache.get("abc123").is_none());

        let stored = artifact("abc123");
        let dir = cache.put(&stored).unwrap();
        assert!(dir.join(RUN_FILE).exists());

        let loaded = cache.get("abc123").expect("expected a cache hit");
        assert_eq!(loaded.cache_key, "abc123");
        assert_eq!(loaded.splits.train, vec!["g1".to_string()]);

        fs::remove_dir_all(cache.entry_dir("abc123").parent().unwrap()).ok();
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let cache = temp_cache("corrupt");
        let dir = cache.entry_dir("deadbeef");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RUN_FILE), "{not json").unwrap();

        assert!(cache.get("deadbeef").is_none());

        fs::remove_dir_all(dir.parent().unwrap()).ok();
    }

    #[test]
    fn test_keys_map_to_distinct_directories() {
        let cache = temp_cache("dirs");
        assert_ne!(cache.entry_dir("a"), cache.entry_dir("b"));
    }
}
