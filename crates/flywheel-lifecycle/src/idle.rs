//! Idle timeout scheduler.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Absolute idle deadline with sliding renewal and explicit overrides.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    timeout: Duration,
    stop_at: DateTime<Utc>,
}

impl IdleTimer {
    /// A timer whose deadline is `now`, i.e. already due.
    pub fn new(timeout: Duration, now: DateTime<Utc>) -> Self {
        Self {
            timeout,
            stop_at: now,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stop_at(&self) -> DateTime<Utc> {
        self.stop_at
    }

    pub fn set_stop_at(&mut self, stop_at: DateTime<Utc>) {
        self.stop_at = stop_at;
    }

    /// Slide the deadline to `now + timeout`.
    pub fn renew(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.stop_at = deadline(now, self.timeout);
        self.stop_at
    }

    /// Replace the deadline with `now + duration`, ignoring the default.
    pub fn stop_in(&mut self, now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
        self.stop_at = deadline(now, duration);
        self.stop_at
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now > self.stop_at
    }

    /// Renew only if the deadline has already passed. Returns whether it did.
    pub fn refresh_if_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if self.expired(now) {
            self.renew(now);
            true
        } else {
            false
        }
    }
}

fn deadline(now: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(after)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
