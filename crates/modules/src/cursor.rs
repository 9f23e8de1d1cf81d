//! Change Event Cursor
//!
//! A checkpointed, reconnecting consumer of the append-only change
//! subscription over the experiment-run table. Produces an unbounded,
//! at-least-once sequence of change events in storage-commit order per run
//! id. Session loss is recovered transparently by re-establishing the
//! subscription cursor from the last committed checkpoint; a fetch timeout
//! is not an error, only "no event yet".

use std::sync::Arc;
use std::time::Duration;

use sigex_core::ChangeEvent;
use sigex_ports::{ChangeSubscriptionSource, SubscriptionError, SubscriptionSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CursorConfig {
    /// Bounded wait per fetch attempt.
    pub fetch_timeout: Duration,
    /// Pause before re-establishing a broken session, so a persistently
    /// failing source does not busy-spin.
    pub reconnect_backoff: Duration,
    /// Discard every operation that is not a plain insert before yielding.
    pub inserts_only: bool,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            reconnect_backoff: Duration::from_secs(10),
            inserts_only: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CursorError {
    #[error("cursor cancelled")]
    Cancelled,

    #[error(transparent)]
    Source(#[from] SubscriptionError),
}

/// Checkpointed consumer over one change subscription.
///
/// Owns its session state explicitly: the subscription cursor is declared
/// lazily on first use and re-declared from the last committed checkpoint
/// after any source failure. One process owns one cursor instance.
pub struct ChangeEventCursor<S> {
    source: Arc<S>,
    settings: SubscriptionSettings,
    config: CursorConfig,
    cancel: CancellationToken,
    established: bool,
    last_committed: Option<u64>,
}

impl<S: ChangeSubscriptionSource> ChangeEventCursor<S> {
    pub fn new(
        source: Arc<S>,
        settings: SubscriptionSettings,
        config: CursorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            settings,
            config,
            cancel,
            established: false,
            last_committed: None,
        }
    }

    pub fn last_committed(&self) -> Option<u64> {
        self.last_committed
    }

    /// Next change event, blocking until one arrives or the cursor is
    /// cancelled. Source failures are absorbed: the session is re-opened
    /// from the last committed checkpoint and consumption continues,
    /// possibly re-delivering events at or after it (at-least-once).
    pub async fn next(&mut self) -> Result<ChangeEvent, CursorError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(CursorError::Cancelled);
            }

            if !self.established {
                if let Err(err) = self.establish().await {
                    warn!(
                        subscription = %self.settings.subscription,
                        error = %err,
                        "failed to establish change subscription cursor, retrying"
                    );
                    self.sleep_cancellable(self.config.reconnect_backoff)
                        .await?;
                    continue;
                }
            }

            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CursorError::Cancelled),
                fetched = self
                    .source
                    .fetch_next(&self.settings, self.config.fetch_timeout) => fetched,
            };

            match fetched {
                // Bounded wait elapsed without an event; retry immediately.
                Ok(None) => {
                    debug!(subscription = %self.settings.subscription, "fetch returned no event");
                    continue;
                }
                Ok(Some(event)) => {
                    if self.config.inserts_only && !event.operation.is_insert() {
                        debug!(
                            run_id = %event.run_id,
                            operation = ?event.operation,
                            "skipping non-insert operation"
                        );
                        // Skipped events still advance the checkpoint, so
                        // a stretch of update-only traffic does not replay
                        // after a restart.
                        if let Err(err) = self.checkpoint(event.watermark).await {
                            warn!(
                                watermark = event.watermark,
                                error = %err,
                                "checkpoint for skipped event failed"
                            );
                        }
                        continue;
                    }
                    return Ok(event);
                }
                Err(err) => {
                    warn!(
                        subscription = %self.settings.subscription,
                        error = %err,
                        "change subscription session failed, re-establishing from checkpoint"
                    );
                    self.established = false;
                }
            }
        }
    }

    /// Commit `watermark` as the new checkpoint. Monotonic: a watermark at
    /// or below the last committed one is a no-op.
    pub async fn checkpoint(&mut self, watermark: u64) -> Result<(), CursorError> {
        if self.last_committed.is_some_and(|last| watermark <= last) {
            return Ok(());
        }

        self.source
            .commit_checkpoint(&self.settings.subscription, watermark)
            .await?;
        self.last_committed = Some(watermark);
        Ok(())
    }

    async fn establish(&mut self) -> Result<(), SubscriptionError> {
        self.source.ensure_subscription(&self.settings).await?;

        // Prefer the in-memory high-water mark; fall back to the persisted
        // checkpoint on a fresh cursor (process restart).
        let since = match self.last_committed {
            Some(watermark) => Some(watermark),
            None => {
                let persisted = self
                    .source
                    .load_checkpoint(&self.settings.subscription)
                    .await?;
                self.last_committed = persisted;
                persisted
            }
        };

        self.source.declare_cursor(&self.settings, since).await?;
        self.established = true;
        info!(
            subscription = %self.settings.subscription,
            since = ?since,
            "change subscription cursor established"
        );
        Ok(())
    }

    async fn sleep_cancellable(&self, duration: Duration) -> Result<(), CursorError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CursorError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeSubscriptionSource, SourceAction};
    use sigex_core::ChangeOperation;

    fn test_settings() -> SubscriptionSettings {
        SubscriptionSettings::new("experiment_runs_sub", "7D")
    }

    fn test_config() -> CursorConfig {
        CursorConfig {
            fetch_timeout: Duration::from_millis(5),
            reconnect_backoff: Duration::ZERO,
            inserts_only: false,
        }
    }

    fn cursor_over(source: Arc<FakeSubscriptionSource>) -> ChangeEventCursor<FakeSubscriptionSource> {
        ChangeEventCursor::new(
            source,
            test_settings(),
            test_config(),
            CancellationToken::new(),
        )
    }

    fn event(run_id: &str, op: ChangeOperation, watermark: u64) -> ChangeEvent {
        ChangeEvent {
            run_id: run_id.to_string(),
            operation: op,
            status: "None".to_string(),
            watermark,
        }
    }

    #[tokio::test]
    async fn test_yields_events_and_treats_timeout_as_no_event() {
        let source = Arc::new(FakeSubscriptionSource::new(vec![
            SourceAction::Timeout,
            SourceAction::Timeout,
            SourceAction::Event(event("r1", ChangeOperation::Insert, 3)),
        ]));
        let mut cursor = cursor_over(source.clone());

        let got = cursor.next().await.unwrap();
        assert_eq!(got.run_id, "r1");
        assert_eq!(got.watermark, 3);
        // All three fetches happened against a single established session.
        assert_eq!(source.declared_cursors().len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_commits_are_monotonic() {
        let source = Arc::new(FakeSubscriptionSource::new(vec![]));
        let mut cursor = cursor_over(source.clone());

        cursor.checkpoint(9).await.unwrap();
        cursor.checkpoint(5).await.unwrap();

        assert_eq!(cursor.last_committed(), Some(9));
        assert_eq!(source.checkpoint("experiment_runs_sub"), Some(9));
        // The stale commit never reached the source.
        assert_eq!(source.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_session_failure_reestablishes_from_checkpoint() {
        let source = Arc::new(FakeSubscriptionSource::new(vec![
            SourceAction::Event(event("r1", ChangeOperation::Insert, 4)),
            SourceAction::Error("connection reset".to_string()),
            SourceAction::Event(event("r2", ChangeOperation::Insert, 7)),
        ]));
        let mut cursor = cursor_over(source.clone());

        let first = cursor.next().await.unwrap();
        cursor.checkpoint(first.watermark).await.unwrap();

        let second = cursor.next().await.unwrap();
        assert_eq!(second.run_id, "r2");

        let declared = source.declared_cursors();
        assert_eq!(declared.len(), 2);
        assert_eq!(declared[0], None); // first establishment: no checkpoint yet
        assert_eq!(declared[1], Some(4)); // resumed from the committed watermark
    }

    #[tokio::test]
    async fn test_fresh_cursor_resumes_from_persisted_checkpoint() {
        let source = Arc::new(FakeSubscriptionSource::new(vec![SourceAction::Event(
            event("r1", ChangeOperation::Insert, 12),
        )]));
        source.seed_checkpoint("experiment_runs_sub", 11);
        let mut cursor = cursor_over(source.clone());

        cursor.next().await.unwrap();
        assert_eq!(source.declared_cursors(), vec![Some(11)]);
        assert_eq!(cursor.last_committed(), Some(11));
    }

    #[tokio::test]
    async fn test_inserts_only_mode_discards_other_operations() {
        let source = Arc::new(FakeSubscriptionSource::new(vec![
            SourceAction::Event(event("r1", ChangeOperation::UpdateInsert, 1)),
            SourceAction::Event(event("r1", ChangeOperation::Delete, 2)),
            SourceAction::Event(event("r2", ChangeOperation::Insert, 3)),
        ]));
        let mut cursor = ChangeEventCursor::new(
            Arc::clone(&source),
            test_settings(),
            CursorConfig {
                inserts_only: true,
                ..test_config()
            },
            CancellationToken::new(),
        );

        let got = cursor.next().await.unwrap();
        assert_eq!(got.run_id, "r2");
        // The discarded events were checkpointed on the way past, so a
        // restart resumes after them instead of replaying the stretch.
        assert_eq!(source.checkpoint("experiment_runs_sub"), Some(2));
        assert_eq!(cursor.last_committed(), Some(2));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_cursor() {
        let source = Arc::new(FakeSubscriptionSource::new(vec![]));
        let cancel = CancellationToken::new();
        let mut cursor =
            ChangeEventCursor::new(source, test_settings(), test_config(), cancel.clone());

        cancel.cancel();
        let err = cursor.next().await.unwrap_err();
        assert!(matches!(err, CursorError::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_interrupts_inflight_fetch() {
        // An exhausted script keeps timing out, so the cursor would loop
        // forever without the cancellation racing the fetch.
        let source = Arc::new(FakeSubscriptionSource::new(vec![]));
        let cancel = CancellationToken::new();
        let mut cursor = ChangeEventCursor::new(
            source,
            test_settings(),
            CursorConfig {
                fetch_timeout: Duration::from_millis(1),
                ..test_config()
            },
            cancel.clone(),
        );

        let handle = tokio::spawn(async move { cursor.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CursorError::Cancelled));
    }
}
