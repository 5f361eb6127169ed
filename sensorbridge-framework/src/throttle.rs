//! Per-key minimum-interval rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Drops events that arrive sooner than `interval` after the last accepted
/// event for the same key.
///
/// This is a debounce, not a queue: rejected events are gone. The first
/// event for a key is always accepted. Accepted timestamps never move
/// backwards, even if callers pass an earlier `Instant`.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_accepted: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// The configured minimum interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Accept or reject an event for `key` happening at `now`.
    ///
    /// Accepting records `now` as the key's new reference point.
    pub fn try_acquire(&self, key: &str, now: Instant) -> bool {
        let mut last_accepted = self.last_accepted.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(last) = last_accepted.get(key) {
            if now.saturating_duration_since(*last) < self.interval {
                return false;
            }
            if now < *last {
                // Zero interval with an out-of-order timestamp: keep the later one.
                return true;
            }
        }

        last_accepted.insert(key.to_string(), now);
        true
    }

    /// When `key` was last accepted, if ever.
    pub fn last_accepted(&self, key: &str) -> Option<Instant> {
        self.last_accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }
}
