//! Postgres-backed repository implementations.

mod algorithm_catalog;
mod run_repository;

pub use algorithm_catalog::PostgresAlgorithmCatalog;
pub use run_repository::PostgresRunRepository;
