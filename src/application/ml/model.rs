use crate::domain::ml::feature_registry::{vector_width, Feature};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::path::Path;

/// Post-hoc calibration applied after the base model's prediction.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Calibration {
    /// Platt-style sigmoid recalibration: `p' = sigmoid(alpha * logit(p) + beta)`.
    Sigmoid { alpha: f64, beta: f64 },
    /// Monotonic lookup table fit by isotonic regression; linear between
    /// knots, clamped at the edges.
    Isotonic {
        thresholds: Vec<f64>,
        values: Vec<f64>,
    },
}

impl Calibration {
    pub fn apply(&self, p: f64) -> f64 {
        match self {
            Calibration::Sigmoid { alpha, beta } => {
                let p = p.clamp(1e-6, 1.0 - 1e-6);
                let logit = (p / (1.0 - p)).ln();
                sigmoid(alpha * logit + beta)
            }
            Calibration::Isotonic { thresholds, values } => {
                if p <= thresholds[0] {
                    return values[0];
                }
                let last = thresholds.len() - 1;
                if p >= thresholds[last] {
                    return values[last];
                }
                let idx = thresholds.partition_point(|t| *t <= p);
                let (t0, t1) = (thresholds[idx - 1], thresholds[idx]);
                let (v0, v1) = (values[idx - 1], values[idx]);
                let span = t1 - t0;
                if span <= 0.0 {
                    return v1;
                }
                v0 + (v1 - v0) * (p - t0) / span
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if let Calibration::Isotonic { thresholds, values } = self {
            if thresholds.is_empty() || thresholds.len() != values.len() {
                bail!(
                    "isotonic calibration needs matching non-empty tables, got {} thresholds / {} values",
                    thresholds.len(),
                    values.len()
                );
            }
            if thresholds.windows(2).any(|w| w[0] > w[1]) {
                bail!("isotonic thresholds must be sorted ascending");
            }
            if values.windows(2).any(|w| w[0] > w[1]) {
                bail!("isotonic values must be monotone non-decreasing");
            }
            if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
                bail!("isotonic values must lie in [0, 1]");
            }
        }
        Ok(())
    }
}

/// The base predictor inside an artifact: a calibrated logistic regression
/// (coefficients over the normalized feature vector) or a serialized
/// smartcore random forest trained on the 0/1 home-win label.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    Logistic {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    Forest {
        forest: RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    },
}

/// On-disk model artifact, produced by the external training pipeline.
/// `features` are canonical registry names in the exact training order;
/// `means`/`stds` are per-slot normalization stats over the expanded
/// (one-hot included) vector.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub version: String,
    pub features: Vec<String>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub model: ModelKind,
    #[serde(default)]
    pub calibration: Option<Calibration>,
}

/// A validated, immutable model handle. Built once per run; shared read-only
/// across the whole search.
pub struct LoadedModel {
    pub name: String,
    pub version: String,
    features: Vec<Feature>,
    width: usize,
    means: Vec<f64>,
    stds: Vec<f64>,
    model: ModelKind,
    calibration: Option<Calibration>,
}

impl LoadedModel {
    /// Load and validate an artifact file. Any failure here is fatal for the
    /// run: the caller asked for a model identity that cannot be honored.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact: {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse model artifact: {}", path.display()))?;
        Self::from_artifact(artifact)
            .with_context(|| format!("Invalid model artifact: {}", path.display()))
    }

    /// Validate an in-memory artifact. Dimension checks happen here, once,
    /// so per-snapshot scoring can assume a consistent geometry.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        let mut features = Vec::with_capacity(artifact.features.len());
        for name in &artifact.features {
            let feature = Feature::parse(name)
                .with_context(|| format!("Unknown feature name in artifact: '{}'", name))?;
            features.push(feature);
        }
        if features.is_empty() {
            bail!("model artifact declares no features");
        }

        let width = vector_width(&features);
        if artifact.means.len() != width || artifact.stds.len() != width {
            bail!(
                "normalization stats width {}/{} does not match feature vector width {}",
                artifact.means.len(),
                artifact.stds.len(),
                width
            );
        }
        if let ModelKind::Logistic { coefficients, .. } = &artifact.model {
            if coefficients.len() != width {
                bail!(
                    "logistic coefficient count {} does not match feature vector width {}",
                    coefficients.len(),
                    width
                );
            }
        }
        if let Some(calibration) = &artifact.calibration {
            calibration.validate()?;
        }

        Ok(Self {
            name: artifact.name,
            version: artifact.version,
            features,
            width,
            means: artifact.means,
            stds: artifact.stds,
            model: artifact.model,
            calibration: artifact.calibration,
        })
    }

    /// Ordered feature identifiers this model consumes.
    pub fn required_features(&self) -> &[Feature] {
        &self.features
    }

    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Score one assembled (raw, un-normalized) feature vector.
    ///
    /// Errors on geometry mismatch, non-finite output, or an out-of-range
    /// final probability; the probability source degrades those to the raw
    /// signal per snapshot.
    pub fn predict_one(&self, raw: &[f64]) -> Result<f64> {
        if raw.len() != self.width {
            bail!(
                "feature vector length {} does not match model width {}",
                raw.len(),
                self.width
            );
        }

        let z: Vec<f64> = raw
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(x, (mean, std))| {
                let std = if *std > 0.0 { *std } else { 1.0 };
                (x - mean) / std
            })
            .collect();

        let base = match &self.model {
            ModelKind::Logistic {
                coefficients,
                intercept,
            } => {
                let dot: f64 = coefficients.iter().zip(z.iter()).map(|(c, x)| c * x).sum();
                sigmoid(dot + intercept)
            }
            ModelKind::Forest { forest } => {
                let matrix = DenseMatrix::from_2d_vec(&vec![z])
                    .map_err(|e| anyhow::anyhow!("Matrix creation failed: {}", e))?;
                let predictions = forest
                    .predict(&matrix)
                    .map_err(|e| anyhow::anyhow!("Forest prediction failed: {}", e))?;
                *predictions
                    .first()
                    .context("Forest returned no prediction")?
            }
        };
        if !base.is_finite() {
            bail!("model produced non-finite output");
        }

        let p = match &self.calibration {
            Some(calibration) => calibration.apply(base),
            None => base,
        };
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            bail!("calibrated probability {} outside [0, 1]", p);
        }
        Ok(p)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
