//! Reconnect backoff.
//!
//! Exponential backoff with jitter: `initial * 2^n`, capped at `max`, plus
//! a random `0..jitter`. After `max_attempts` consecutive failures the
//! policy gives up until [`ReconnectPolicy::reset`] is called.

use std::time::Duration;

use crate::constants::{
    RECONNECT_INITIAL_BACKOFF, RECONNECT_JITTER, RECONNECT_MAX_ATTEMPTS, RECONNECT_MAX_BACKOFF,
};

/// Backoff state for one connection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    jitter: Duration,
    attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            RECONNECT_INITIAL_BACKOFF,
            RECONNECT_MAX_BACKOFF,
            RECONNECT_MAX_ATTEMPTS,
            RECONNECT_JITTER,
        )
    }
}

impl ReconnectPolicy {
    /// Create a policy. `max_attempts == 0` retries forever.
    #[must_use]
    pub fn new(initial: Duration, max: Duration, max_attempts: u32, jitter: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_attempts,
            jitter,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let shift = self.attempts.min(16);
        let base = self
            .initial
            .saturating_mul(1u32 << shift)
            .min(self.max);
        self.attempts += 1;

        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::random::<u64>() % jitter_ms)
        };

        Some(base + jitter)
    }

    /// Forget previous failures (called once a connection is confirmed).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failed attempts so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the policy has given up.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts != 0 && self.attempts >= self.max_attempts
    }
}
