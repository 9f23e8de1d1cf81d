//! Pure construction of the execution graph submitted for a run.

pub mod contract;
mod dates;
mod spec;

pub use dates::WeeklyDates;
pub use spec::{
    build_workflow_spec, FinalizeTarget, WorkflowSpecInput, TRIALS_MOUNT_PATH, TRIALS_VOLUME_NAME,
};
