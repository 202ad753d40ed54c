//! Tunables for the sync queue.

use crate::{error::Result, Backoff, Error};
use serde::{Deserialize, Serialize};

/// Default number of failed submissions before an item is parked.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default cap on the number of entries in a merged view.
pub const DEFAULT_DISPLAY_LIMIT: usize = 100;

/// How submission failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryPolicy {
    /// Every failure is retried until the attempt cap (default)
    #[default]
    Uniform,
    /// Failures the remote reports as non-retryable park the item at once
    Classified,
}

/// Configuration shared by the queue and its views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub display_limit: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            display_limit: DEFAULT_DISPLAY_LIMIT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_display_limit(mut self, limit: usize) -> Self {
        self.display_limit = limit;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        self.backoff.validate()
    }
}
