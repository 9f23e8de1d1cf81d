//! Names of the orchestration store objects.
//!
//! Kept in one place because the same identifiers appear in SQL here and
//! in the finalize step the workflow runs inside the cluster.

pub const ORCHESTRATION_SCHEMA: &str = "orchestration";

pub const EXPERIMENT_RUNS_TABLE: &str = "signal_generator_experiment_runs";
pub const TRIALS_TABLE: &str = "signal_generator_trials";
pub const ALGORITHMS_TABLE: &str = "signal_generator_algorithms";

/// Change subscription over the experiment-run table.
pub const RUNS_SUBSCRIPTION: &str = "signal_generator_experiment_runs_subscription";

/// Watermark persistence for subscription cursors.
pub const CHECKPOINTS_TABLE: &str = "subscription_checkpoints";
