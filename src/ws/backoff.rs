//! Reconnection delay policy.
//!
//! One policy object serves both failure paths: reconnect-on-close and the
//! heartbeat-forced close. The deterministic part is a pure function of the
//! attempt count so it can be pinned down in tests; jitter is layered on
//! top to desynchronize retries when many clients share an outage.

use std::time::Duration;

use rand::Rng as _;

use super::config::ReconnectConfig;

/// Exponential backoff with a ceiling and uniform jitter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    jitter_max: Duration,
    max_attempts: Option<u32>,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base: config.backoff_base,
            cap: config.max_backoff,
            jitter_max: config.jitter_max,
            max_attempts: config.max_attempts,
        }
    }

    /// Deterministic delay for a retry attempt (0-indexed), before jitter:
    /// `min(base * 2^attempt, cap)`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay for a retry attempt plus random jitter.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_max.is_zero() {
            Duration::ZERO
        } else {
            rand::rng().random_range(Duration::ZERO..self.jitter_max)
        };
        self.delay(attempt).saturating_add(jitter)
    }

    /// Whether the attempt counter has reached the configured ceiling.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}
