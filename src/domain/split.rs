use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// One of the three game partitions of a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

/// Deterministic game-id partition. Within each split the ids are sorted so
/// downstream iteration order (and therefore cross-game drawdown sequencing)
/// is reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    pub seed: u64,
    pub train: Vec<String>,
    pub valid: Vec<String>,
    pub test: Vec<String>,
}

impl SplitAssignment {
    pub fn games(&self, split: Split) -> &[String] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }
}

/// Partition a game-id universe into train/valid/test.
///
/// Pure function of (sorted ids, seed, ratios): sort and dedup the universe,
/// shuffle with a seeded generator, then cut at `floor(n * train_ratio)` and
/// `floor(n * (train_ratio + valid_ratio))`. Splitting at game granularity
/// keeps every snapshot of a game inside exactly one split.
pub fn split_games(
    game_ids: &[String],
    seed: u64,
    train_ratio: f64,
    valid_ratio: f64,
) -> SplitAssignment {
    let mut ids: Vec<String> = game_ids.to_vec();
    ids.sort();
    ids.dedup();

    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);

    let n = ids.len();
    let train_cut = (n as f64 * train_ratio).floor() as usize;
    let valid_cut = (n as f64 * (train_ratio + valid_ratio)).floor() as usize;
    let valid_cut = valid_cut.clamp(train_cut, n);

    let mut train: Vec<String> = ids[..train_cut].to_vec();
    let mut valid: Vec<String> = ids[train_cut..valid_cut].to_vec();
    let mut test: Vec<String> = ids[valid_cut..].to_vec();
    train.sort();
    valid.sort();
    test.sort();

    SplitAssignment {
        seed,
        train,
        valid,
        test,
    }
}
