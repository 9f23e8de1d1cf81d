//! Domain Core - Business Logic and Shared Types
//!
//! This crate contains the experiment-run aggregate, its value objects and
//! the status state machine shared by every other crate in the workspace.

pub mod algorithm;
pub mod change_event;
pub mod error;
pub mod experiment_run;

pub use crate::algorithm::AlgorithmStep;
pub use crate::change_event::{ChangeEvent, ChangeOperation};
pub use crate::error::DomainError;
pub use crate::experiment_run::{
    ExperimentHyperparameters, ExperimentRun, ExperimentStatus, Trial,
};

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;
