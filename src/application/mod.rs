pub mod ml;
pub mod search;
pub mod simulation;
