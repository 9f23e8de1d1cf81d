//! Infrastructure Adapters
//!
//! Concrete implementations of the orchestrator's ports: RisingWave over
//! the PostgreSQL protocol for the run store and change subscription, the
//! HPO service over HTTP, and the Argo workflow controller via the
//! Kubernetes API.

pub mod config;
pub mod db;
pub mod hpo;
pub mod kubernetes;
pub mod postgres;
pub mod risingwave;

pub use crate::config::{AppConfig, ConfigError};
pub use crate::hpo::HpoClient;
pub use crate::kubernetes::ArgoClusterClient;
pub use crate::postgres::{PostgresAlgorithmCatalog, PostgresRunRepository};
pub use crate::risingwave::RisingWaveSubscriptionSource;
