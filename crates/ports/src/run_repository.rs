//! Experiment Run Repository Port
//!
//! Defines the interface for experiment-run persistence.

use async_trait::async_trait;
use sigex_core::ExperimentRun;

/// Experiment run repository port
#[async_trait]
pub trait ExperimentRunRepository: Send + Sync {
    /// Load the full aggregate, trials included.
    async fn get(&self, run_id: &str) -> Result<ExperimentRun, RunRepositoryError>;

    /// Read only the raw persisted status string.
    ///
    /// The dispatcher uses this for its fresh re-read before routing an
    /// event; the raw string is kept so an unrecognized value can be
    /// surfaced as fatal instead of silently defaulted.
    async fn get_status(&self, run_id: &str) -> Result<String, RunRepositoryError>;

    /// Persist status, trials, hyperparameters, training end and the
    /// resource request together.
    async fn save(&self, run: &ExperimentRun) -> Result<(), RunRepositoryError>;
}

/// Experiment run repository error
#[derive(thiserror::Error, Debug)]
pub enum RunRepositoryError {
    #[error("experiment run not found: {0}")]
    NotFound(String),

    #[error("invalid experiment run data: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<RunRepositoryError> for sigex_core::DomainError {
    fn from(err: RunRepositoryError) -> Self {
        match err {
            RunRepositoryError::NotFound(id) => Self::NotFound(id),
            RunRepositoryError::Validation(detail) => Self::Validation(detail),
            RunRepositoryError::Database(detail) => Self::Infrastructure(detail),
        }
    }
}
