//! Retry delay computation.
//!
//! `delay = min(cap, base * 2^attempts) + jitter`, where jitter is drawn
//! uniformly from `0..=jitter_ms`. The exponential part saturates instead of
//! overflowing, so arbitrarily large attempt counts are safe.

use crate::{error::Result, Error};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_MS: u64 = 1_000;

/// Default cap on the exponential part in milliseconds.
pub const DEFAULT_CAP_MS: u64 = 60_000;

/// Default upper bound of the random jitter in milliseconds.
pub const DEFAULT_JITTER_MS: u64 = 1_000;

/// Capped exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub jitter_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BASE_MS,
            cap_ms: DEFAULT_CAP_MS,
            jitter_ms: DEFAULT_JITTER_MS,
        }
    }
}

impl Backoff {
    pub fn new(base_ms: u64, cap_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base_ms,
            cap_ms,
            jitter_ms,
        }
    }

    /// Check that the parameters describe a usable schedule.
    pub fn validate(&self) -> Result<()> {
        if self.base_ms == 0 {
            return Err(Error::InvalidConfig("backoff base must be positive".into()));
        }
        if self.cap_ms < self.base_ms {
            return Err(Error::InvalidConfig(format!(
                "backoff cap ({}ms) is below the base ({}ms)",
                self.cap_ms, self.base_ms
            )));
        }
        Ok(())
    }

    /// The deterministic part of the delay for a given attempt count.
    pub fn base_delay(&self, attempts: u32) -> Duration {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        let ms = self.base_ms.saturating_mul(factor).min(self.cap_ms);
        Duration::from_millis(ms)
    }

    /// Full delay before the next attempt, jitter drawn from `rng`.
    pub fn delay<R: Rng + ?Sized>(&self, attempts: u32, rng: &mut R) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=self.jitter_ms)
        };
        self.base_delay(attempts) + Duration::from_millis(jitter)
    }

    /// Largest delay this schedule can ever produce.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.cap_ms.saturating_add(self.jitter_ms))
    }
}
