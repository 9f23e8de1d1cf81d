//! Orchestration Engine
//!
//! The event-driven core of the orchestrator: a checkpointed change-event
//! cursor over the experiment-run table, a status-keyed dispatcher with
//! retry-until-success semantics, the init and start stage handlers, and
//! the pure workflow spec builder.

pub mod cursor;
pub mod dispatcher;
pub mod init_run;
pub mod retry;
pub mod start_run;
pub mod trials_config;
pub mod workflow;

#[cfg(test)]
pub(crate) mod fakes;

pub use crate::cursor::{ChangeEventCursor, CursorConfig, CursorError};
pub use crate::dispatcher::{DispatchError, Dispatcher, StageHandler};
pub use crate::init_run::InitRunHandler;
pub use crate::retry::RetryPolicy;
pub use crate::start_run::{StartRunHandler, StartRunOptions};
pub use crate::workflow::{build_workflow_spec, FinalizeTarget, WorkflowSpecInput};
