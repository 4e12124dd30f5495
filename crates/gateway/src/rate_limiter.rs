//! Fixed-window rate limiter over the shared store.
//!
//! Each identity gets one counter per window, keyed
//! `ratelimit:{identity}:{bucket}` with `bucket = now_secs / window_secs`.
//! The counter is created with a TTL of one window on its first increment
//! and is never decremented, so rejected requests still count.

use std::sync::Arc;
use std::time::Duration;

use insights_shared::{Clock, Identity, InsightsError, SharedStore, StoreError, SystemClock};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Quota settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub quota: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Quota usage after an admitted request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
    /// Time until the current window closes
    pub reset_after: Duration,
}

/// Per-identity fixed-window limiter.
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, config: RateLimitConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn SharedStore>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether the counter store answers.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    /// Consume one unit of `identity`'s quota.
    ///
    /// # Errors
    ///
    /// - [`InsightsError::RateLimitExceeded`] when the post-increment count is
    ///   above the quota
    /// - [`InsightsError::StoreUnavailable`] when the counter cannot be read;
    ///   the request is rejected rather than admitted unmetered
    pub async fn check(&self, identity: &Identity) -> Result<QuotaStatus, InsightsError> {
        let window_secs = self.config.window.as_secs().max(1);
        let now_secs = u64::try_from(self.clock.now().timestamp()).unwrap_or(0);
        let bucket = now_secs / window_secs;
        let reset_after = Duration::from_secs((bucket + 1) * window_secs - now_secs);

        let key = format!("ratelimit:{}:{}", identity, bucket);
        let used = self
            .store
            .incr_with_expiry(&key, Duration::from_secs(window_secs))
            .await
            .map_err(|e| {
                error!("Rate limiter store unavailable for {}: {}", identity, e);
                InsightsError::from(e)
            })?;

        let limit = self.config.quota;
        if used > limit {
            warn!(
                "Rate limit exceeded for {}: {} of {} in window {}",
                identity, used, limit, bucket
            );
            return Err(InsightsError::RateLimitExceeded { limit, reset_after });
        }

        debug!("Quota for {}: {}/{}", identity, used, limit);
        Ok(QuotaStatus {
            limit,
            used,
            remaining: limit - used,
            reset_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use insights_shared::{ErrorKind, ManualClock, MemoryStore};

    struct DownStore;

    #[async_trait]
    impl SharedStore for DownStore {
        async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn set_with_expiry(
            &self,
            _key: &str,
            _value: String,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn limiter(quota: u64, window_secs: u64) -> (Arc<ManualClock>, Arc<MemoryStore>, RateLimiter) {
        // 10s into a 60s window
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::with_clock(
            store.clone(),
            RateLimitConfig {
                quota,
                window: Duration::from_secs(window_secs),
            },
            clock.clone(),
        );
        (clock, store, limiter)
    }

    #[tokio::test]
    async fn test_admits_quota_then_rejects() {
        let (_clock, _store, limiter) = limiter(3, 60);
        let identity = Identity::new("abc");

        for used in 1..=3 {
            let status = limiter.check(&identity).await.unwrap();
            assert_eq!(status.used, used);
            assert_eq!(status.remaining, 3 - used);
            assert_eq!(status.reset_after, Duration::from_secs(50));
        }

        match limiter.check(&identity).await.unwrap_err() {
            InsightsError::RateLimitExceeded { limit, reset_after } => {
                assert_eq!(limit, 3);
                assert_eq!(reset_after, Duration::from_secs(50));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_requests_still_count() {
        let (_clock, store, limiter) = limiter(1, 60);
        let identity = Identity::new("abc");

        limiter.check(&identity).await.unwrap();
        assert!(limiter.check(&identity).await.is_err());
        assert!(limiter.check(&identity).await.is_err());

        let bucket = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap().timestamp() / 60;
        let key = format!("ratelimit:abc:{bucket}");
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_new_window_resets_quota() {
        let (clock, _store, limiter) = limiter(2, 60);
        let identity = Identity::new("abc");

        limiter.check(&identity).await.unwrap();
        limiter.check(&identity).await.unwrap();
        assert!(limiter.check(&identity).await.is_err());

        clock.advance(Duration::from_secs(50));
        let status = limiter.check(&identity).await.unwrap();
        assert_eq!(status.used, 1);
        assert_eq!(status.reset_after, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_identities_are_counted_separately() {
        let (_clock, _store, limiter) = limiter(1, 60);
        limiter.check(&Identity::new("alice")).await.unwrap();
        limiter.check(&Identity::new("bob")).await.unwrap();
        assert!(limiter.check(&Identity::new("alice")).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let limiter = RateLimiter::new(Arc::new(DownStore), RateLimitConfig::default());
        let err = limiter.check(&Identity::new("abc")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_admit_exactly_quota() {
        let (_clock, _store, limiter) = limiter(10, 60);
        let limiter = Arc::new(limiter);

        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.check(&Identity::new("abc")).await.is_ok()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
