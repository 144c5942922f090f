pub mod database;
pub mod snapshot_repository;
