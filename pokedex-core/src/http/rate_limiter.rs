//! Per-host request pacing.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::time::sleep_until;

/// Enforces a minimum delay between request starts to the same host.
///
/// Slots are reserved under the map's entry lock, so concurrent workers
/// queue up behind each other instead of all passing the check at once.
pub struct RateLimiter {
    min_delay: Duration,
    /// Start time of the most recently reserved request per host.
    next_slot: DashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            next_slot: DashMap::new(),
        }
    }

    /// Wait until this caller's slot for `host` comes up.
    pub async fn wait(&self, host: &str) {
        if self.min_delay.is_zero() {
            return;
        }

        let slot = self.reserve(host, Instant::now());
        sleep_until(slot.into()).await;
    }

    /// Reserve the next free start time for `host`, given the current time.
    fn reserve(&self, host: &str, now: Instant) -> Instant {
        let mut slot = now;
        self.next_slot
            .entry(host.to_string())
            .and_modify(|last| {
                slot = (*last + self.min_delay).max(now);
                *last = slot;
            })
            .or_insert(now);
        slot
    }

    /// Get the number of hosts we've tracked.
    pub fn tracked_hosts(&self) -> usize {
        self.next_slot.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
