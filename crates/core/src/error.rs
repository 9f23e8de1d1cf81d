//! Error types shared across the system

use thiserror::Error;

/// Base error type for the entire system
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Violated invariant that a retry cannot fix (zero trial count, empty
    /// trial list, malformed trial payload, mismatched week-day range).
    /// The dispatcher still retries these, but they are logged distinctly
    /// so an operator can tell them apart from transient failures.
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unrecognized experiment status: {0}")]
    UnrecognizedStatus(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl DomainError {
    pub fn invalid_state_transition(from: &str, to: &str) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// True for failures a retry will never fix.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_) | Self::InvalidStateTransition { .. } | Self::Validation(_)
        )
    }
}
