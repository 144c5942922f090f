pub mod loader;
pub mod simulator;
