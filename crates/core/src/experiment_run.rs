//! Experiment Run Aggregate
//!
//! The aggregate root for one orchestrated execution of a set of trials for
//! a signal-generation algorithm. The status advances monotonically through
//! `None -> Starting -> Started -> Finished`; it never regresses. `Finished`
//! is written by the workflow's finalize step, outside this process.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::Result;

/// Lifecycle status of an experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentStatus {
    None,
    Starting,
    Started,
    Finished,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Starting => "Starting",
            Self::Started => "Started",
            Self::Finished => "Finished",
        }
    }

    /// Valid forward transitions. The status never moves backwards.
    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        matches!(
            (self, next),
            (Self::None, Self::Starting)
                | (Self::Starting, Self::Started)
                | (Self::Started, Self::Finished)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl FromStr for ExperimentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "None" => Ok(Self::None),
            "Starting" => Ok(Self::Starting),
            "Started" => Ok(Self::Started),
            "Finished" => Ok(Self::Finished),
            other => Err(DomainError::UnrecognizedStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable hyperparameters fixed when the run is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentHyperparameters {
    pub number_of_weeks_duration: u32,
    pub number_of_weeks_historical_data: u32,
    pub tickers_raw: Option<String>,
    pub tickers_preset: Option<String>,
    pub signal_generator_algorithm_id: String,
}

/// One hyperparameter assignment to be evaluated within an experiment run.
///
/// The payload is kept opaque here; the start stage parses it as JSON when
/// assembling the trials configuration object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trial {
    pub id: String,
    pub hyperparameters_raw: Vec<u8>,
}

impl Trial {
    pub fn new(id: impl Into<String>, hyperparameters_raw: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            hyperparameters_raw,
        }
    }
}

/// Experiment run aggregate root.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRun {
    pub id: String,
    pub number_of_trials: i32,
    pub training_end: NaiveDate,
    pub hyperparameters: ExperimentHyperparameters,
    pub number_of_cpu_cores_requested: i32,
    status: ExperimentStatus,
    trials: Vec<Trial>,
}

impl ExperimentRun {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        number_of_trials: i32,
        training_end: NaiveDate,
        trials: Vec<Trial>,
        hyperparameters: ExperimentHyperparameters,
        status: ExperimentStatus,
        number_of_cpu_cores_requested: i32,
    ) -> Self {
        Self {
            id: id.into(),
            number_of_trials,
            training_end,
            hyperparameters,
            number_of_cpu_cores_requested,
            status,
            trials,
        }
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Attach the generated trials and advance `None -> Starting`.
    ///
    /// # Errors
    /// `DomainError::Precondition` when the trial list is empty,
    /// `DomainError::InvalidStateTransition` when the run already advanced.
    pub fn initialize(&mut self, trials: Vec<Trial>) -> Result<()> {
        if trials.is_empty() {
            return Err(DomainError::Precondition(
                "trials must not be empty".to_string(),
            ));
        }
        if !self.status.can_transition_to(ExperimentStatus::Starting) {
            return Err(DomainError::invalid_state_transition(
                self.status.as_str(),
                ExperimentStatus::Starting.as_str(),
            ));
        }

        self.status = ExperimentStatus::Starting;
        self.trials = trials;
        Ok(())
    }

    /// Advance `Starting -> Started` after the execution graph is submitted.
    ///
    /// # Errors
    /// `DomainError::InvalidStateTransition` when the run is not `Starting`.
    pub fn set_started(&mut self) -> Result<()> {
        if !self.status.can_transition_to(ExperimentStatus::Started) {
            return Err(DomainError::invalid_state_transition(
                self.status.as_str(),
                ExperimentStatus::Started.as_str(),
            ));
        }

        self.status = ExperimentStatus::Started;
        Ok(())
    }
}
