//! Retry policy for failed stage attempts
//!
//! Modeled as explicit configuration rather than hard-coded sleeps so tests
//! can inject a zero-delay policy.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed backoff between attempts.
    pub interval: Duration,
    /// Upper bound on attempts per event. `None` retries indefinitely,
    /// which is the production setting: a stage stays blocked until it
    /// succeeds.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Zero-delay policy with a bounded attempt count, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            interval: Duration::ZERO,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(10))
    }
}
