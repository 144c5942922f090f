use crate::application::ml::model::LoadedModel;
use crate::domain::ml::feature_registry::{assemble, Feature, FeatureColumns};
use crate::domain::snapshot::Snapshot;
use std::sync::Arc;
use tracing::warn;

/// Where the simulator's signal probability comes from: the raw stored ESPN
/// probability (default) or a trained model scored per snapshot.
#[derive(Clone)]
pub enum ProbabilitySource {
    RawSignal,
    Model(Arc<LoadedModel>),
}

impl ProbabilitySource {
    /// Features that must be assembled per snapshot; empty for the raw path.
    pub fn required_features(&self) -> &[Feature] {
        match self {
            ProbabilitySource::RawSignal => &[],
            ProbabilitySource::Model(model) => model.required_features(),
        }
    }

    /// Optional columns the loader must fetch for this source.
    pub fn columns(&self) -> FeatureColumns {
        FeatureColumns::for_features(self.required_features())
    }

    pub fn describe(&self) -> String {
        match self {
            ProbabilitySource::RawSignal => "espn:raw".to_string(),
            ProbabilitySource::Model(model) => format!("model:{}", model.identity()),
        }
    }

    /// Produce the signal probability for one snapshot.
    ///
    /// Never fails: a per-snapshot scoring error degrades to the raw signal
    /// with a warning, so one bad row cannot abort a whole game or run. The
    /// warning stream is the systemic-signal channel when a model
    /// misbehaves pervasively.
    pub fn score(&self, snap: &Snapshot) -> f64 {
        match self {
            ProbabilitySource::RawSignal => snap.home_win_prob,
            ProbabilitySource::Model(model) => {
                let raw = assemble(model.required_features(), snap);
                match model.predict_one(&raw) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(
                            "Model {} failed on game {} seq {}: {}. Falling back to raw signal.",
                            model.identity(),
                            snap.game_id,
                            snap.seq,
                            e
                        );
                        snap.home_win_prob
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::model::{Calibration, ModelArtifact, ModelKind};
    use crate::domain::snapshot::test_snapshot;

    fn model(coefficients: Vec<f64>, features: Vec<&str>) -> ProbabilitySource {
        let width = coefficients.len();
        let artifact = ModelArtifact {
            name: "wp_logistic".to_string(),
            version: "2024.1".to_string(),
            features: features.into_iter().map(String::from).collect(),
            means: vec![0.0; width],
            stds: vec![1.0; width],
            model: ModelKind::Logistic {
                coefficients,
                intercept: 0.0,
            },
            calibration: None,
        };
        ProbabilitySource::Model(Arc::new(LoadedModel::from_artifact(artifact).unwrap()))
    }

    #[test]
    fn test_raw_source_passes_signal_through() {
        let mut snap = test_snapshot();
        snap.home_win_prob = 0.731;
        assert_eq!(ProbabilitySource::RawSignal.score(&snap), 0.731);
        assert!(ProbabilitySource::RawSignal.required_features().is_empty());
    }

    #[test]
    fn test_model_scores_with_missing_optional_columns() {
        // Lag and delta are absent from the snapshot; fallbacks keep the
        // vector geometry intact and the output a valid probability.
        let source = model(vec![1.0, 1.0, 1.0], vec!["signal_prob", "prob_lag", "prob_delta"]);
        let snap = test_snapshot();
        let p = source.score(&snap);
        assert!((0.0..=1.0).contains(&p), "score {} out of range", p);
    }

    #[test]
    fn test_scoring_failure_falls_back_to_raw_signal() {
        // NaN coefficient forces a non-finite base prediction per snapshot.
        let source = model(vec![f64::NAN], vec!["signal_prob"]);
        let mut snap = test_snapshot();
        snap.home_win_prob = 0.644;
        assert_eq!(source.score(&snap), 0.644);
    }

    #[test]
    fn test_calibrated_model_output_stays_in_range() {
        let artifact = ModelArtifact {
            name: "wp_logistic".to_string(),
            version: "2024.1".to_string(),
            features: vec!["signal_prob".to_string()],
            means: vec![0.0],
            stds: vec![1.0],
            model: ModelKind::Logistic {
                coefficients: vec![4.0],
                intercept: -2.0,
            },
            calibration: Some(Calibration::Sigmoid {
                alpha: 1.2,
                beta: 0.1,
            }),
        };
        let source =
            ProbabilitySource::Model(Arc::new(LoadedModel::from_artifact(artifact).unwrap()));
        for signal in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let mut snap = test_snapshot();
            snap.home_win_prob = signal;
            let p = source.score(&snap);
            assert!((0.0..=1.0).contains(&p), "score {} out of range", p);
        }
    }

    #[test]
    fn test_columns_reflect_model_needs() {
        let source = model(vec![1.0, 1.0], vec!["signal_prob", "prob_lag"]);
        let cols = source.columns();
        assert!(cols.lag);
        assert!(!cols.pregame);
        assert_eq!(
            ProbabilitySource::RawSignal.columns(),
            FeatureColumns::default()
        );
    }
}
