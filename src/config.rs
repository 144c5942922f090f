use crate::application::simulation::simulator::TradeCosts;
use crate::domain::grid::GridSpec;
use crate::domain::trading::fee_model::KalshiFeeModel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Bumped whenever the result layout or simulation semantics change, so
/// stale cache entries from older builds can never be returned.
const CACHE_KEY_VERSION: u32 = 2;

/// Identity sentinel for the raw-signal path. Distinct from every named
/// model so "no model" and "some model" can never collide in the cache.
pub const RAW_SIGNAL_IDENTITY: &str = "espn:raw";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no game universe: provide a season or an explicit game list")]
    NoUniverse,
    #[error("threshold grid is empty for bounds {0}")]
    EmptyGrid(String),
    #[error(
        "split ratios must satisfy train > 0, valid >= 0, train + valid <= 1 (got train={train}, valid={valid})"
    )]
    BadSplitRatios { train: f64, valid: f64 },
    #[error("top_n must be positive")]
    ZeroTopN,
    #[error("notional must be positive (got {0})")]
    BadNotional(f64),
    #[error("exclusion windows must be non-negative (got first={first}, last={last})")]
    NegativeExclusion { first: f64, last: f64 },
    #[error("fee rate must be non-negative (got {0})")]
    BadFeeRate(f64),
    #[error("slippage rate must be non-negative (got {0})")]
    BadSlippage(f64),
}

/// Venue cost assumptions. The convex curve and its rounding increment are
/// parameters, not constants: the fee schedule is still being verified
/// against live fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub enabled: bool,
    pub rate: f64,
    pub min_increment: f64,
    pub slippage_rate: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 0.07,
            min_increment: 0.01,
            slippage_rate: 0.0,
        }
    }
}

/// Full configuration of one search run. Everything that affects the output
/// feeds the cache key; everything that only affects execution (worker
/// count, output root, cache bypass) stays out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub season: Option<String>,
    /// Explicit game list; overrides `season` when present.
    pub games: Option<Vec<String>>,
    pub grid: GridSpec,
    /// Path to a model artifact; `None` trades the raw ESPN signal.
    pub model_path: Option<PathBuf>,
    pub seed: u64,
    pub train_ratio: f64,
    pub valid_ratio: f64,
    pub top_n: usize,
    /// Validity floor: train-split trade count a grid point needs before it
    /// may be selected.
    pub min_trades: usize,
    pub exclude_first_seconds: f64,
    pub exclude_last_seconds: f64,
    pub notional: f64,
    pub fees: FeeConfig,
    /// Parallel workers for the grid phase; 0 lets rayon pick.
    pub workers: usize,
    pub out_dir: PathBuf,
    /// Skip the cache lookup (results are still written).
    pub no_cache: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            season: None,
            games: None,
            grid: GridSpec::default(),
            model_path: None,
            seed: 42,
            train_ratio: 0.6,
            valid_ratio: 0.2,
            top_n: 10,
            min_trades: 30,
            exclude_first_seconds: 300.0,
            exclude_last_seconds: 120.0,
            notional: 100.0,
            fees: FeeConfig::default(),
            workers: 0,
            out_dir: PathBuf::from("runs"),
            no_cache: false,
        }
    }
}

/// Canonical material hashed into the cache key. Field order is fixed and
/// the game list is sorted, so identical configurations always serialize
/// identically.
#[derive(Serialize)]
struct CacheKeyMaterial<'a> {
    version: u32,
    season: &'a Option<String>,
    games: Option<Vec<String>>,
    grid: &'a GridSpec,
    probability_source: String,
    seed: u64,
    train_ratio: f64,
    valid_ratio: f64,
    top_n: usize,
    min_trades: usize,
    exclude_first_seconds: f64,
    exclude_last_seconds: f64,
    notional: f64,
    fees: &'a FeeConfig,
}

impl SearchConfig {
    /// Fail-fast validation, run before any data is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.season.is_none() && self.games.as_ref().is_none_or(|g| g.is_empty()) {
            return Err(ConfigError::NoUniverse);
        }
        if self.grid.generate().is_empty() {
            return Err(ConfigError::EmptyGrid(self.grid.describe()));
        }
        if self.train_ratio <= 0.0
            || self.valid_ratio < 0.0
            || self.train_ratio + self.valid_ratio > 1.0 + 1e-9
        {
            return Err(ConfigError::BadSplitRatios {
                train: self.train_ratio,
                valid: self.valid_ratio,
            });
        }
        if self.top_n == 0 {
            return Err(ConfigError::ZeroTopN);
        }
        if self.notional <= 0.0 {
            return Err(ConfigError::BadNotional(self.notional));
        }
        if self.exclude_first_seconds < 0.0 || self.exclude_last_seconds < 0.0 {
            return Err(ConfigError::NegativeExclusion {
                first: self.exclude_first_seconds,
                last: self.exclude_last_seconds,
            });
        }
        if self.fees.rate < 0.0 {
            return Err(ConfigError::BadFeeRate(self.fees.rate));
        }
        if self.fees.slippage_rate < 0.0 {
            return Err(ConfigError::BadSlippage(self.fees.slippage_rate));
        }
        Ok(())
    }

    /// Identity of the active probability source for keys and reports.
    pub fn probability_source_identity(&self) -> String {
        match &self.model_path {
            None => RAW_SIGNAL_IDENTITY.to_string(),
            Some(path) => format!("model:{}", path.display()),
        }
    }

    /// Content-addressed key over every output-affecting parameter.
    pub fn cache_key(&self) -> Result<String> {
        let games = self.games.as_ref().map(|g| {
            let mut sorted = g.clone();
            sorted.sort();
            sorted.dedup();
            sorted
        });
        let material = CacheKeyMaterial {
            version: CACHE_KEY_VERSION,
            season: &self.season,
            games,
            grid: &self.grid,
            probability_source: self.probability_source_identity(),
            seed: self.seed,
            train_ratio: self.train_ratio,
            valid_ratio: self.valid_ratio,
            top_n: self.top_n,
            min_trades: self.min_trades,
            exclude_first_seconds: self.exclude_first_seconds,
            exclude_last_seconds: self.exclude_last_seconds,
            notional: self.notional,
            fees: &self.fees,
        };
        let canonical =
            serde_json::to_string(&material).context("Failed to serialize cache key material")?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(hex::encode(digest))
    }

    /// Cost assumptions handed to the simulator.
    pub fn trade_costs(&self) -> TradeCosts {
        TradeCosts {
            fee_model: self.fees.enabled.then(|| {
                Arc::new(KalshiFeeModel::new(self.fees.rate, self.fees.min_increment))
                    as Arc<dyn crate::domain::trading::fee_model::FeeModel>
            }),
            slippage_rate: self.fees.slippage_rate,
            notional: self.notional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SearchConfig {
        SearchConfig {
            season: Some("2023-24".to_string()),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_default_config_with_season_validates() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_missing_universe_is_rejected() {
        let config = SearchConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::NoUniverse)));
        let config = SearchConfig {
            games: Some(vec![]),
            ..SearchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoUniverse)));
    }

    #[test]
    fn test_empty_grid_is_rejected() {
        let mut config = base();
        config.grid.entry_max = 0.0; // no positive entry values survive
        assert!(matches!(config.validate(), Err(ConfigError::EmptyGrid(_))));
    }

    #[test]
    fn test_bad_ratios_are_rejected() {
        let mut config = base();
        config.train_ratio = 0.9;
        config.valid_ratio = 0.3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadSplitRatios { .. })
        ));
    }

    #[test]
    fn test_negative_cost_rates_get_distinct_errors() {
        let mut config = base();
        config.fees.rate = -0.01;
        assert!(matches!(config.validate(), Err(ConfigError::BadFeeRate(_))));

        let mut config = base();
        config.fees.slippage_rate = -0.001;
        assert!(matches!(config.validate(), Err(ConfigError::BadSlippage(_))));
    }

    #[test]
    fn test_cache_key_is_stable() {
        let config = base();
        assert_eq!(config.cache_key().unwrap(), config.cache_key().unwrap());
    }

    #[test]
    fn test_cache_key_ignores_game_list_ordering() {
        let mut a = base();
        a.season = None;
        a.games = Some(vec!["g2".into(), "g1".into(), "g3".into()]);
        let mut b = a.clone();
        b.games = Some(vec!["g3".into(), "g1".into(), "g2".into()]);
        assert_eq!(a.cache_key().unwrap(), b.cache_key().unwrap());
    }

    #[test]
    fn test_cache_key_distinguishes_model_from_raw_signal() {
        let raw = base();
        let mut modeled = base();
        modeled.model_path = Some(PathBuf::from("models/wp_logistic.json"));
        assert_ne!(raw.cache_key().unwrap(), modeled.cache_key().unwrap());

        let mut other_model = base();
        other_model.model_path = Some(PathBuf::from("models/wp_forest.json"));
        assert_ne!(
            modeled.cache_key().unwrap(),
            other_model.cache_key().unwrap()
        );
    }

    #[test]
    fn test_cache_key_ignores_execution_only_settings() {
        let a = base();
        let mut b = base();
        b.workers = 12;
        b.no_cache = true;
        b.out_dir = PathBuf::from("elsewhere");
        assert_eq!(a.cache_key().unwrap(), b.cache_key().unwrap());
    }

    #[test]
    fn test_cache_key_changes_with_seed_and_fees() {
        let a = base();
        let mut b = base();
        b.seed = 43;
        assert_ne!(a.cache_key().unwrap(), b.cache_key().unwrap());

        let mut c = base();
        c.fees.enabled = false;
        assert_ne!(a.cache_key().unwrap(), c.cache_key().unwrap());
    }
}
