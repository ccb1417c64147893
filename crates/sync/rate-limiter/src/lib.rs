//! # supasaasy rate limiter
//!
//! Fixed-window rate limiter keyed by an arbitrary string (typically an
//! `app_key`). Each key gets its own 60-second window and request counter;
//! the window resets wholesale once it elapses, rather than sliding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

const WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a [`RateLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after_seconds: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window rate limiter. One window per key, reset once `WINDOW`
/// elapses since the window's first admitted request.
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Checks whether a request for `key` is admitted under `limit_per_minute`.
    /// On `Allow`, the key's counter is incremented as a side effect.
    pub async fn check(&self, key: &str, limit_per_minute: u32) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(window.started_at) >= WINDOW {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= limit_per_minute {
            let retry_after = WINDOW
                .saturating_sub(now.duration_since(window.started_at))
                .as_secs()
                .max(1);
            tracing::debug!(key, limit_per_minute, "rate limit exceeded");
            return Decision::Deny {
                retry_after_seconds: retry_after,
            };
        }

        window.count += 1;
        Decision::Allow
    }

    /// Drops all tracked windows. Exposed for tests; production callers have
    /// no use for a shared limiter's state being wiped mid-run.
    pub async fn reset(&self) {
        self.windows.write().await.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_requests_up_to_the_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert_eq!(limiter.check("app_1", 5).await, Decision::Allow);
        }
        let denied = limiter.check("app_1", 5).await;
        assert!(!denied.is_allowed());
    }

    #[tokio::test]
    async fn tracks_separate_windows_per_key() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("app_1", 3).await.is_allowed());
        }
        assert!(!limiter.check("app_1", 3).await.is_allowed());
        assert!(limiter.check("app_2", 3).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("app_1", 1).await.is_allowed());
        assert!(!limiter.check("app_1", 1).await.is_allowed());

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(limiter.check("app_1", 1).await.is_allowed());
    }

    #[tokio::test]
    async fn deny_reports_a_positive_retry_after() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("app_1", 1).await.is_allowed());
        match limiter.check("app_1", 1).await {
            Decision::Deny { retry_after_seconds } => assert!(retry_after_seconds > 0),
            Decision::Allow => panic!("expected deny"),
        }
    }
}
