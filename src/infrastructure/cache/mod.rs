pub mod results_cache;
