use crate::domain::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

/// Number of one-hot slots for the period indicator: Q1-Q4 plus a single
/// overtime bucket. This width MUST match the training pipeline exactly;
/// changing it is a breaking change for every model artifact.
pub const PERIOD_SLOTS: usize = 5;

/// Every quantity a probability model may request from a snapshot.
///
/// Models declare their inputs as an ordered list of these identifiers, and
/// assembly walks that list slot by slot. A typed registry (instead of
/// matching on name substrings) is what guarantees the assembled vector's
/// dimensionality always equals the model's expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    /// Raw ESPN home-win probability.
    SignalProb,
    /// Seconds left on the regulation clock.
    SecondsRemaining,
    /// Home minus away score.
    PointDiff,
    /// One-hot period indicator (PERIOD_SLOTS wide).
    Period,
    /// Signal probability one snapshot back. Missing -> current signal
    /// (assume no change).
    ProbLag,
    /// Signal probability change since the previous snapshot. Missing -> 0
    /// (assume no trend).
    ProbDelta,
    /// Precomputed score/time interaction column. Missing -> 0.
    ScoreTimeRatio,
    /// De-vigged pre-game market probability. Missing -> current signal.
    PregameFairProb,
    /// Bookmaker margin removed during de-vigging. Missing -> 0.
    PregameOverround,
    /// Pre-game point spread (home negative when favored). Missing -> 0.
    PregameSpread,
    /// Pre-game total line. Missing -> 0.
    PregameTotal,
}

impl Feature {
    /// Canonical feature name as stored in model artifacts.
    pub fn name(&self) -> &'static str {
        match self {
            Feature::SignalProb => "signal_prob",
            Feature::SecondsRemaining => "seconds_remaining",
            Feature::PointDiff => "point_diff",
            Feature::Period => "period",
            Feature::ProbLag => "prob_lag",
            Feature::ProbDelta => "prob_delta",
            Feature::ScoreTimeRatio => "score_time_ratio",
            Feature::PregameFairProb => "pregame_fair_prob",
            Feature::PregameOverround => "pregame_overround",
            Feature::PregameSpread => "pregame_spread",
            Feature::PregameTotal => "pregame_total",
        }
    }

    /// Parse a canonical name. Unknown names are a load-time error for the
    /// artifact, never a silent skip.
    pub fn parse(name: &str) -> Option<Feature> {
        match name {
            "signal_prob" => Some(Feature::SignalProb),
            "seconds_remaining" => Some(Feature::SecondsRemaining),
            "point_diff" => Some(Feature::PointDiff),
            "period" => Some(Feature::Period),
            "prob_lag" => Some(Feature::ProbLag),
            "prob_delta" => Some(Feature::ProbDelta),
            "score_time_ratio" => Some(Feature::ScoreTimeRatio),
            "pregame_fair_prob" => Some(Feature::PregameFairProb),
            "pregame_overround" => Some(Feature::PregameOverround),
            "pregame_spread" => Some(Feature::PregameSpread),
            "pregame_total" => Some(Feature::PregameTotal),
            _ => None,
        }
    }

    /// How many vector slots this feature occupies.
    pub fn width(&self) -> usize {
        match self {
            Feature::Period => PERIOD_SLOTS,
            _ => 1,
        }
    }

    /// Append this feature's slots, applying its fallback when the
    /// underlying column is absent.
    fn fill(&self, snap: &Snapshot, out: &mut Vec<f64>) {
        match self {
            Feature::SignalProb => out.push(snap.home_win_prob),
            Feature::SecondsRemaining => out.push(snap.seconds_remaining),
            Feature::PointDiff => out.push(snap.point_diff as f64),
            Feature::Period => {
                // Clamp into Q1..Q4 + OT; a missing/garbage period reads as Q1.
                let period = if snap.period >= 1 { snap.period as usize } else { 1 };
                let slot = period.min(PERIOD_SLOTS) - 1;
                for i in 0..PERIOD_SLOTS {
                    out.push(if i == slot { 1.0 } else { 0.0 });
                }
            }
            Feature::ProbLag => out.push(snap.prob_lag.unwrap_or(snap.home_win_prob)),
            Feature::ProbDelta => out.push(snap.prob_delta.unwrap_or(0.0)),
            Feature::ScoreTimeRatio => out.push(snap.score_time_ratio.unwrap_or(0.0)),
            Feature::PregameFairProb => {
                out.push(snap.pregame_fair_prob.unwrap_or(snap.home_win_prob))
            }
            Feature::PregameOverround => out.push(snap.pregame_overround.unwrap_or(0.0)),
            Feature::PregameSpread => out.push(snap.pregame_spread.unwrap_or(0.0)),
            Feature::PregameTotal => out.push(snap.pregame_total.unwrap_or(0.0)),
        }
    }
}

/// Total vector width for an ordered feature list.
pub fn vector_width(features: &[Feature]) -> usize {
    features.iter().map(|f| f.width()).sum()
}

/// Assemble the raw (un-normalized) feature vector for one snapshot.
///
/// Output length always equals `vector_width(features)` regardless of which
/// optional columns are populated; fallbacks keep the dimensionality fixed.
pub fn assemble(features: &[Feature], snap: &Snapshot) -> Vec<f64> {
    let mut out = Vec::with_capacity(vector_width(features));
    for feature in features {
        feature.fill(snap, &mut out);
    }
    out
}

/// Which optional snapshot columns a feature list needs the loader to fetch.
/// Features the model never asks for are neither queried nor computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureColumns {
    pub lag: bool,
    pub delta: bool,
    pub interaction: bool,
    pub pregame: bool,
}

impl FeatureColumns {
    pub fn for_features(features: &[Feature]) -> Self {
        let mut cols = Self::default();
        for feature in features {
            match feature {
                Feature::ProbLag => cols.lag = true,
                Feature::ProbDelta => cols.delta = true,
                Feature::ScoreTimeRatio => cols.interaction = true,
                Feature::PregameFairProb
                | Feature::PregameOverround
                | Feature::PregameSpread
                | Feature::PregameTotal => cols.pregame = true,
                _ => {}
            }
        }
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::test_snapshot;

    #[test]
    fn test_parse_round_trips_every_feature() {
        let all = [
            Feature::SignalProb,
            Feature::SecondsRemaining,
            Feature::PointDiff,
            Feature::Period,
            Feature::ProbLag,
            Feature::ProbDelta,
            Feature::ScoreTimeRatio,
            Feature::PregameFairProb,
            Feature::PregameOverround,
            Feature::PregameSpread,
            Feature::PregameTotal,
        ];
        for f in all {
            assert_eq!(Feature::parse(f.name()), Some(f));
        }
        assert_eq!(Feature::parse("sharpe_ratio"), None);
    }

    #[test]
    fn test_vector_width_counts_one_hot_slots() {
        let features = [Feature::SignalProb, Feature::Period, Feature::PointDiff];
        assert_eq!(vector_width(&features), 2 + PERIOD_SLOTS);
    }

    #[test]
    fn test_assemble_length_is_fixed_under_missing_columns() {
        let features = [
            Feature::SignalProb,
            Feature::ProbLag,
            Feature::ProbDelta,
            Feature::ScoreTimeRatio,
            Feature::PregameFairProb,
        ];
        let mut snap = test_snapshot();
        snap.home_win_prob = 0.62;
        // All optional columns absent.
        let vec = assemble(&features, &snap);
        assert_eq!(vec.len(), vector_width(&features));
        assert_eq!(vec[0], 0.62);
        assert_eq!(vec[1], 0.62); // lag falls back to current signal
        assert_eq!(vec[2], 0.0); // delta falls back to no trend
        assert_eq!(vec[3], 0.0);
        assert_eq!(vec[4], 0.62); // pregame fair prob falls back to signal

        // Populated columns take precedence over fallbacks.
        snap.prob_lag = Some(0.55);
        snap.prob_delta = Some(0.07);
        let vec = assemble(&features, &snap);
        assert_eq!(vec[1], 0.55);
        assert_eq!(vec[2], 0.07);
    }

    #[test]
    fn test_period_one_hot_encoding() {
        let mut snap = test_snapshot();
        snap.period = 3;
        let vec = assemble(&[Feature::Period], &snap);
        assert_eq!(vec, vec![0.0, 0.0, 1.0, 0.0, 0.0]);

        // Deep overtime collapses into the single OT bucket.
        snap.period = 7;
        let vec = assemble(&[Feature::Period], &snap);
        assert_eq!(vec, vec![0.0, 0.0, 0.0, 0.0, 1.0]);

        // Garbage period falls back to Q1.
        snap.period = 0;
        let vec = assemble(&[Feature::Period], &snap);
        assert_eq!(vec, vec![1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_feature_columns_only_what_is_needed() {
        let cols = FeatureColumns::for_features(&[Feature::SignalProb, Feature::PointDiff]);
        assert_eq!(cols, FeatureColumns::default());

        let cols = FeatureColumns::for_features(&[Feature::ProbLag, Feature::PregameSpread]);
        assert!(cols.lag && cols.pregame);
        assert!(!cols.delta && !cols.interaction);
    }
}
