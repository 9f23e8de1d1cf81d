//! Change Subscription Port
//!
//! Low-level operations over the storage engine's append-only change
//! subscription: subscription lifecycle, server-side cursors, bounded-wait
//! fetches and monotonic checkpoint commits. The reconnect/resume policy
//! lives above this port, in the engine's `ChangeEventCursor`.

use std::time::Duration;

use async_trait::async_trait;
use sigex_core::ChangeEvent;

/// Names and retention for one subscription/cursor pair.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub subscription: String,
    pub cursor: String,
    /// Bounded retention window used when the subscription is first created.
    pub retention: String,
}

impl SubscriptionSettings {
    pub fn new(subscription: impl Into<String>, retention: impl Into<String>) -> Self {
        let subscription = subscription.into();
        let cursor = format!("{subscription}_cursor");
        Self {
            subscription,
            cursor,
            retention: retention.into(),
        }
    }
}

#[async_trait]
pub trait ChangeSubscriptionSource: Send + Sync {
    /// Create the named subscription over the experiment-run table if it
    /// does not exist yet.
    async fn ensure_subscription(
        &self,
        settings: &SubscriptionSettings,
    ) -> Result<(), SubscriptionError>;

    /// Declare a server-side positional cursor over the subscription,
    /// starting after `since` when given, otherwise from the beginning of
    /// current retention.
    async fn declare_cursor(
        &self,
        settings: &SubscriptionSettings,
        since: Option<u64>,
    ) -> Result<(), SubscriptionError>;

    /// Fetch the next event, waiting at most `timeout`. An elapsed wait is
    /// not an error; it yields `Ok(None)`.
    async fn fetch_next(
        &self,
        settings: &SubscriptionSettings,
        timeout: Duration,
    ) -> Result<Option<ChangeEvent>, SubscriptionError>;

    /// Persist `watermark` as the subscription's checkpoint. Commits are
    /// monotonic: a watermark at or below the stored one must be a no-op.
    async fn commit_checkpoint(
        &self,
        subscription: &str,
        watermark: u64,
    ) -> Result<(), SubscriptionError>;

    /// Last committed checkpoint watermark, if any.
    async fn load_checkpoint(&self, subscription: &str)
        -> Result<Option<u64>, SubscriptionError>;
}

#[derive(thiserror::Error, Debug)]
pub enum SubscriptionError {
    #[error("subscription session error: {0}")]
    Session(String),

    #[error("checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("malformed change event: {0}")]
    Malformed(String),
}
