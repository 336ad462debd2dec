//! Constant-backoff reconnect bookkeeping.

use std::time::{Duration, Instant};

/// Decides when the next connection attempt is due.
///
/// The schedule holds no timer of its own; callers pass the current instant
/// so any [`Clock`](super::Clock) can drive it.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    interval: Duration,
    next_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl ReconnectSchedule {
    /// Creates an idle schedule retrying every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_attempt: None,
            consecutive_failures: 0,
        }
    }

    /// Records a failed or lost connection and returns when to retry.
    pub fn record_failure(&mut self, now: Instant) -> Instant {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let next = now + self.interval;
        self.next_attempt = Some(next);
        next
    }

    /// Clears pending retries after a successful handshake.
    pub const fn record_success(&mut self) {
        self.next_attempt = None;
        self.consecutive_failures = 0;
    }

    /// Drops any pending retry without resetting the failure count.
    pub const fn cancel(&mut self) {
        self.next_attempt = None;
    }

    /// Instant of the next retry, if one is scheduled.
    #[must_use]
    pub const fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    /// Returns `true` when a retry is scheduled at or before `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_attempt.is_some_and(|next| next <= now)
    }

    /// Time left until the next retry; zero when due, `None` when idle.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next_attempt
            .map(|next| next.saturating_duration_since(now))
    }

    /// Failures since the last successful connection.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Fixed delay between attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}
