//! Ports - Abstraction Layer
//!
//! This crate defines ports (traits) that represent the interfaces needed by
//! the orchestration engine. These are implemented by adapters in the
//! infrastructure layer.

pub mod algorithm_catalog;
pub mod change_subscription;
pub mod cluster_client;
pub mod run_repository;
pub mod trials_generator;

pub use crate::algorithm_catalog::{AlgorithmCatalog, CatalogError};
pub use crate::change_subscription::{
    ChangeSubscriptionSource, SubscriptionError, SubscriptionSettings,
};
pub use crate::cluster_client::{
    ClusterClient, ClusterClientError, GraphCompletionEvent, RUN_ID_ANNOTATION,
};
pub use crate::run_repository::{ExperimentRunRepository, RunRepositoryError};
pub use crate::trials_generator::{TrialsGenerator, TrialsGeneratorError};
