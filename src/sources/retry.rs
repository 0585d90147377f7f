//! Bounded retry policy for transient read failures.

use std::time::Duration;

/// How often, and how patiently, a momentarily unreadable file is re-read.
///
/// Editors frequently truncate or replace a file in several steps. A read
/// landing in the middle of such a burst fails or sees an empty file; the
/// policy re-reads with exponential backoff before giving up on the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and first backoff delay.
    ///
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// A policy that reads exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total number of read attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(25))
    }
}
