//! In-process, per-identity rate limiting. There is exactly one backend here
//! (no Redis): the concurrency model treats the bucket map as singleton
//! state guarded by one internal lock per key, consulted on every request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub current: u32,
    pub limit: u32,
    pub reset_epoch_seconds: u64,
    pub retry_after_seconds: u64,
}

#[async_trait]
pub trait RateLimiterEngine: Send + Sync {
    async fn check(&self, key: &str, limit: u32) -> RateDecision;
}

/// Fixed-window counter per identity key, window reset lazily on next check
/// once it has elapsed. O(1) per check.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    buckets: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    window: Duration,
}

impl InMemoryRateLimiter {
    pub fn new(window_secs: u64) -> Self {
        Self { buckets: Arc::new(Mutex::new(HashMap::new())), window: Duration::from_secs(window_secs.max(1)) }
    }
}

#[async_trait]
impl RateLimiterEngine for InMemoryRateLimiter {
    async fn check(&self, key: &str, limit: u32) -> RateDecision {
        let mut guard = self.buckets.lock().await;
        let now = Instant::now();
        let entry = guard.entry(key.to_string()).or_insert((0, now));
        if now.duration_since(entry.1) >= self.window {
            *entry = (0, now);
        }
        entry.0 += 1;
        let current = entry.0;
        let window_elapsed = now.duration_since(entry.1);
        let remaining_in_window = self.window.saturating_sub(window_elapsed);
        let reset_epoch_seconds = epoch_seconds_from_now(remaining_in_window);
        RateDecision {
            allowed: current <= limit,
            current,
            limit,
            reset_epoch_seconds,
            retry_after_seconds: remaining_in_window.as_secs().max(1),
        }
    }
}

fn epoch_seconds_from_now(delta: Duration) -> u64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now + delta).as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_breaches() {
        let limiter = InMemoryRateLimiter::new(60);
        for _ in 0..5 {
            let decision = limiter.check("user:1", 5).await;
            assert!(decision.allowed);
        }
        let decision = limiter.check("user:1", 5).await;
        assert!(!decision.allowed);
        assert_eq!(decision.current, 6);
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let limiter = InMemoryRateLimiter::new(60);
        for _ in 0..5 {
            assert!(limiter.check("user:a", 5).await.allowed);
        }
        assert!(limiter.check("user:b", 5).await.allowed);
    }
}
