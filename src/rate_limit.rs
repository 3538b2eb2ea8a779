//! Per-user message rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks when each user last had a message accepted.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_accepted: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `user` may send now, given `min_interval` between accepted
    /// messages. An accepted check records the current time; a denied
    /// check changes nothing. A zero interval always allows.
    pub fn check(&self, user: &str, min_interval: Duration) -> bool {
        self.check_at(user, min_interval, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, user: &str, min_interval: Duration, now: Instant) -> bool {
        if min_interval.is_zero() {
            return true;
        }

        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = last.get(user) {
            if now.saturating_duration_since(*previous) < min_interval {
                return false;
            }
        }
        last.insert(user.to_owned(), now);
        true
    }

    /// Forget `user`'s history.
    pub fn reset(&self, user: &str) {
        self.last_accepted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(user);
    }
}
