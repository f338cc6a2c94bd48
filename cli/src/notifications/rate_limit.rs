//! Rolling-window rate limiter for native notifications.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Allows at most `max` events per rolling `window`.
///
/// Timestamps older than the window are pruned before every check, so the
/// limiter never needs a background timer.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing `max` events per `window`.
    #[must_use]
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            timestamps: VecDeque::with_capacity(max),
        }
    }

    /// Whether another event may happen at `now`.
    pub fn has_capacity(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.timestamps.len() < self.max
    }

    /// Record an event at `now`.
    pub fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    /// Instant at which the next slot frees up, or `None` if one is free now.
    pub fn next_slot_at(&mut self, now: Instant) -> Option<Instant> {
        if self.has_capacity(now) {
            return None;
        }
        self.timestamps.front().map(|oldest| *oldest + self.window)
    }

    /// Number of events inside the current window.
    #[cfg(test)]
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.timestamps.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.has_capacity(now));
            limiter.record(now);
        }
        assert!(!limiter.has_capacity(now));
    }

    #[test]
    fn test_window_rolls_forward() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.record(start);
        limiter.record(start + Duration::from_secs(30));
        assert!(!limiter.has_capacity(start + Duration::from_secs(59)));

        // First entry expires exactly one window after it was recorded
        assert!(limiter.has_capacity(start + Duration::from_secs(60)));
        assert_eq!(limiter.in_window(start + Duration::from_secs(60)), 1);
    }

    #[test]
    fn test_next_slot_at() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(limiter.next_slot_at(start), None);
        limiter.record(start);
        assert_eq!(
            limiter.next_slot_at(start + Duration::from_secs(1)),
            Some(start + Duration::from_secs(10))
        );
        assert_eq!(limiter.next_slot_at(start + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_zero_max_never_allows() {
        let mut limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert!(!limiter.has_capacity(Instant::now()));
    }
}
