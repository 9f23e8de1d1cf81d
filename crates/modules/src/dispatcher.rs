//! Change-event dispatcher
//!
//! Drains the change-event cursor and routes every insert to the stage
//! handler that matches the run's current status. The status is re-read
//! from the repository on every attempt rather than trusted from the
//! event payload, so an event that arrives late or is retried after a
//! partial failure always dispatches against current state.

use std::sync::Arc;

use async_trait::async_trait;
use sigex_core::{ChangeEvent, DomainError, ExperimentStatus};
use sigex_ports::{ChangeSubscriptionSource, ExperimentRunRepository};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cursor::{ChangeEventCursor, CursorError};
use crate::retry::RetryPolicy;

/// One lifecycle stage of an experiment run.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, run_id: &str) -> sigex_core::Result<()>;
}

#[derive(Error, Debug)]
pub enum DispatchError {
    /// The status column holds a value outside the known lifecycle.
    /// Retrying cannot help and processing further events could reorder
    /// the stream, so the dispatcher stops.
    #[error("unrecognized run status: {0}")]
    UnrecognizedStatus(String),

    #[error("retries exhausted for run {run_id} after {attempts} attempts")]
    RetriesExhausted { run_id: String, attempts: u32 },

    #[error("cursor failed: {0}")]
    Cursor(#[from] CursorError),

    #[error("dispatcher cancelled")]
    Cancelled,
}

pub struct Dispatcher<R, I, S> {
    repository: Arc<R>,
    init_handler: Arc<I>,
    start_handler: Arc<S>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<R, I, S> Dispatcher<R, I, S>
where
    R: ExperimentRunRepository,
    I: StageHandler,
    S: StageHandler,
{
    pub fn new(
        repository: Arc<R>,
        init_handler: Arc<I>,
        start_handler: Arc<S>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            repository,
            init_handler,
            start_handler,
            retry,
            cancel,
        }
    }

    /// Drains the cursor until cancellation or a fatal error.
    ///
    /// The watermark is checkpointed only after the event was fully
    /// processed, so a crash replays the in-flight event instead of
    /// dropping it. A checkpoint failure is logged and tolerated; the
    /// handlers are idempotent so the replay is harmless.
    pub async fn run<Src>(&self, mut cursor: ChangeEventCursor<Src>) -> Result<(), DispatchError>
    where
        Src: ChangeSubscriptionSource,
    {
        info!("dispatcher started");
        loop {
            let event = match cursor.next().await {
                Ok(event) => event,
                Err(CursorError::Cancelled) => {
                    info!("dispatcher stopping: cancellation requested");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            match self.process_event(&event).await {
                Ok(()) => {}
                Err(DispatchError::Cancelled) => {
                    info!("dispatcher stopping: cancellation requested");
                    return Ok(());
                }
                Err(err) => {
                    error!(run_id = %event.run_id, error = %err, "event processing failed");
                    return Err(err);
                }
            }

            if let Err(err) = cursor.checkpoint(event.watermark).await {
                warn!(
                    watermark = event.watermark,
                    error = %err,
                    "checkpoint failed, event will replay after restart"
                );
            }
        }
    }

    /// Runs the dispatch loop and restarts it with a fresh cursor after a
    /// crash, resuming from the persisted checkpoint. Only cancellation
    /// and an unrecognized status end the supervision.
    pub async fn run_supervised<Src, F>(&self, make_cursor: F) -> Result<(), DispatchError>
    where
        Src: ChangeSubscriptionSource,
        F: Fn() -> ChangeEventCursor<Src>,
    {
        loop {
            match self.run(make_cursor()).await {
                Ok(()) => return Ok(()),
                Err(err @ DispatchError::UnrecognizedStatus(_)) => return Err(err),
                Err(err) => {
                    error!(error = %err, "dispatch loop crashed, restarting");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.retry.interval) => {}
                    }
                }
            }
        }
    }

    async fn process_event(&self, event: &ChangeEvent) -> Result<(), DispatchError> {
        debug!(
            run_id = %event.run_id,
            operation = ?event.operation,
            watermark = event.watermark,
            "processing change event"
        );

        let mut attempts = 0u32;
        loop {
            match self.dispatch(&event.run_id).await {
                Ok(()) => return Ok(()),
                Err(DomainError::UnrecognizedStatus(raw)) => {
                    return Err(DispatchError::UnrecognizedStatus(raw));
                }
                Err(err) => {
                    attempts += 1;
                    if err.is_precondition() {
                        warn!(
                            run_id = %event.run_id,
                            attempts,
                            error = %err,
                            "stage failed on a precondition, retrying will not help until the run data changes"
                        );
                    } else {
                        warn!(
                            run_id = %event.run_id,
                            attempts,
                            error = %err,
                            "stage failed, retrying"
                        );
                    }
                    if self.retry.exhausted(attempts) {
                        return Err(DispatchError::RetriesExhausted {
                            run_id: event.run_id.clone(),
                            attempts,
                        });
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(DispatchError::Cancelled),
                        _ = tokio::time::sleep(self.retry.interval) => {}
                    }
                }
            }
        }
    }

    /// Routes a single attempt based on the run's current status.
    async fn dispatch(&self, run_id: &str) -> sigex_core::Result<()> {
        let raw = self
            .repository
            .get_status(run_id)
            .await
            .map_err(DomainError::from)?;
        let status: ExperimentStatus = raw.parse()?;

        match status {
            ExperimentStatus::None => self.init_handler.handle(run_id).await,
            ExperimentStatus::Starting => self.start_handler.handle(run_id).await,
            ExperimentStatus::Started | ExperimentStatus::Finished => {
                debug!(run_id, status = %status, "no stage for status, skipping");
                Ok(())
            }
        }
    }
}
