pub mod engine;
pub mod reporting;
pub mod selection;
