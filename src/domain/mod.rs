pub mod grid;
pub mod ml;
pub mod performance;
pub mod ports;
pub mod snapshot;
pub mod split;
pub mod trading;
