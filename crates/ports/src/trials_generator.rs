//! Trials Generator Port
//!
//! One call per trial against the external hyperparameter-generation
//! service. Calls are made strictly sequentially, in trial order, by the
//! init stage.

use async_trait::async_trait;

#[async_trait]
pub trait TrialsGenerator: Send + Sync {
    /// Request hyperparameters for one trial of a study.
    ///
    /// `space` is the algorithm's hyperparameter-space document (JSON
    /// bytes); the result is the generated hyperparameter assignment,
    /// also JSON bytes, stored opaquely on the trial.
    async fn generate(
        &self,
        study: &str,
        trial_id: &str,
        space: &[u8],
    ) -> Result<Vec<u8>, TrialsGeneratorError>;
}

#[derive(thiserror::Error, Debug)]
pub enum TrialsGeneratorError {
    #[error("hyperparameter space is not valid JSON: {0}")]
    InvalidSpace(String),

    #[error("generation service returned {status} for trial {trial_id}")]
    ServiceStatus { trial_id: String, status: u16 },

    #[error("generation request failed: {0}")]
    Transport(String),
}

impl From<TrialsGeneratorError> for sigex_core::DomainError {
    fn from(err: TrialsGeneratorError) -> Self {
        match err {
            TrialsGeneratorError::InvalidSpace(_) => Self::Validation(err.to_string()),
            TrialsGeneratorError::ServiceStatus { .. } | TrialsGeneratorError::Transport(_) => {
                Self::Infrastructure(err.to_string())
            }
        }
    }
}
