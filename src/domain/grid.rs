use serde::{Deserialize, Serialize};

/// One (entry_threshold, exit_threshold) pair under search.
///
/// Invariant: `entry > 0`, `exit >= 0`, `exit < entry`. Enforced by
/// `GridSpec::generate`, which is the only producer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub entry: f64,
    pub exit: f64,
}

impl GridPoint {
    /// Stable label used in tables and logs.
    pub fn label(&self) -> String {
        format!("entry={:.4} exit={:.4}", self.entry, self.exit)
    }
}

/// Threshold grid bounds and steps, loadable from CLI flags or a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub entry_min: f64,
    pub entry_max: f64,
    pub entry_step: f64,
    pub exit_min: f64,
    pub exit_max: f64,
    pub exit_step: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            entry_min: 0.02,
            entry_max: 0.10,
            entry_step: 0.01,
            exit_min: 0.00,
            exit_max: 0.05,
            exit_step: 0.01,
        }
    }
}

const STEP_EPS: f64 = 1e-9;

impl GridSpec {
    /// Enumerate all valid grid points, entry-major / exit-minor.
    ///
    /// Ordering is stable for identical bounds, which cache keys and top-N
    /// tie-breaking both rely on. Non-positive entries and negative exits are
    /// skipped; pairs failing `exit < entry` are filtered out.
    pub fn generate(&self) -> Vec<GridPoint> {
        let mut points = Vec::new();
        for entry in step_range(self.entry_min, self.entry_max, self.entry_step) {
            if entry <= STEP_EPS {
                continue;
            }
            for exit in step_range(self.exit_min, self.exit_max, self.exit_step) {
                if exit < 0.0 {
                    continue;
                }
                if exit < entry - STEP_EPS {
                    points.push(GridPoint { entry, exit });
                }
            }
        }
        points
    }

    pub fn describe(&self) -> String {
        format!(
            "entry [{:.4}, {:.4}] step {:.4} x exit [{:.4}, {:.4}] step {:.4}",
            self.entry_min,
            self.entry_max,
            self.entry_step,
            self.exit_min,
            self.exit_max,
            self.exit_step
        )
    }
}

/// Inclusive float range without accumulated stepping error.
fn step_range(min: f64, max: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || max < min {
        return Vec::new();
    }
    let count = ((max - min) / step + STEP_EPS).floor() as usize;
    (0..=count).map(|i| min + step * i as f64).collect()
}
