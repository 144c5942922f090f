pub mod model;
pub mod probability_source;
