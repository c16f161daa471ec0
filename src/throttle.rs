//! Per-key minimum-interval rate limiter.
//!
//! Each throttle key owns an async mutex guarding the timestamp of the last
//! permitted call. A caller holds that mutex across wait-then-stamp, so two
//! callers of the same key can never be spaced closer than `min_interval`.
//! Distinct keys never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

type Slot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Enforces a minimum spacing between calls sharing a key.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    /// Wait until `key` may be called again, then record the call.
    pub async fn throttle(&self, key: &str) {
        let slot = self.slot(key);
        let mut last = slot.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(key, wait_ms = wait.as_millis() as u64, "Throttling call");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(300);

    #[tokio::test]
    async fn first_call_is_not_delayed() {
        let limiter = RateLimiter::new(INTERVAL);
        let start = Instant::now();
        limiter.throttle("pyle").await;
        assert!(start.elapsed() < INTERVAL);
    }

    #[tokio::test]
    async fn contended_calls_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(INTERVAL));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.throttle("pyle").await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap + Duration::from_millis(5) >= INTERVAL, "gap {gap:?}");
        }
    }

    #[tokio::test]
    async fn second_call_issued_shortly_after_is_delayed() {
        let limiter = Arc::new(RateLimiter::new(INTERVAL));
        let offset = Duration::from_millis(100);

        let first = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter.throttle("pyle").await;
                Instant::now()
            })
        };
        tokio::time::sleep(offset).await;

        let issued = Instant::now();
        limiter.throttle("pyle").await;
        let delay = issued.elapsed();
        let first_stamp = first.await.unwrap();

        // Sleep overshoot can push `issued` past the nominal offset.
        let tolerance = Duration::from_millis(10);
        let head_start = issued.saturating_duration_since(first_stamp);
        assert!(delay + tolerance >= INTERVAL.saturating_sub(head_start));
        assert!(delay + Duration::from_millis(50) >= INTERVAL - offset);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.throttle("a").await;
        limiter.throttle("b").await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
