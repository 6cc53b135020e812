//! Fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::{RateLimitBackend, RateLimitConfig};
use crate::observability::metrics;
use crate::policy::{Violation, ViolationKind};
use crate::rate_limit::clock::{Clock, SystemClock};
use crate::rate_limit::fallback::FallbackStore;
use crate::rate_limit::local::LocalStore;
use crate::rate_limit::redis_store::{RedisStore, RedisStoreConfig};
use crate::rate_limit::store::{CounterStore, StoreError};

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Checks left in this window; 0 once the limit is reached.
    pub remaining: u32,
    /// Window close, Unix epoch milliseconds.
    pub reset_at_ms: u64,
    pub limit: u32,
}

impl RateDecision {
    /// Time until the window closes, rounded up to whole seconds, at least 1s.
    pub fn retry_after(&self, now_ms: u64) -> Duration {
        let wait_ms = self.reset_at_ms.saturating_sub(now_ms);
        Duration::from_secs(wait_ms.div_ceil(1_000).max(1))
    }

    /// Turn a denial into an error for `?` propagation.
    pub fn into_result(self, now_ms: u64) -> Result<Self, RateLimitExceeded> {
        if self.allowed {
            Ok(self)
        } else {
            Err(RateLimitExceeded {
                limit: self.limit,
                reset_at_ms: self.reset_at_ms,
                retry_after_secs: self.retry_after(now_ms).as_secs(),
            })
        }
    }
}

/// A caller used up its allowance for the current window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit of {limit} exceeded, retry after {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub reset_at_ms: u64,
    pub retry_after_secs: u64,
}

impl From<RateLimitExceeded> for Violation {
    fn from(e: RateLimitExceeded) -> Self {
        Violation::with_detail(
            ViolationKind::RateLimitExceeded,
            format!("retry after {}s", e.retry_after_secs),
        )
    }
}

/// Counts checks per `(scope, identity)` key in fixed windows.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used for `retry_after` arithmetic; keep it the same as the store's.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// In-process limiter.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalStore::new()))
    }

    /// Build the limiter described by configuration.
    ///
    /// With the Redis backend the store is wrapped in a [`FallbackStore`]. If
    /// Redis cannot be reached at startup the limiter runs on the local store
    /// and a warning is logged.
    pub async fn from_config(config: &RateLimitConfig) -> Self {
        let local = LocalStore::new().with_sweep_threshold(config.local_sweep_threshold);

        match (&config.backend, config.redis_url.as_deref()) {
            (RateLimitBackend::Redis, Some(url)) => {
                let redis_config = RedisStoreConfig {
                    key_prefix: config.key_prefix.clone(),
                    op_timeout: Duration::from_millis(config.store_timeout_ms),
                    ..RedisStoreConfig::default()
                };
                match RedisStore::connect_with_config(url, redis_config).await {
                    Ok(redis) => Self::new(Arc::new(FallbackStore::new(Arc::new(redis), local))),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Redis counter store unreachable at startup, enforcing limits per process"
                        );
                        Self::new(Arc::new(local))
                    }
                }
            }
            (RateLimitBackend::Redis, None) => {
                tracing::warn!("Redis backend selected without a URL, enforcing limits per process");
                Self::new(Arc::new(local))
            }
            (RateLimitBackend::Local, _) => Self::new(Arc::new(local)),
        }
    }

    /// Count one check for `identity` within `scope`.
    ///
    /// The first `limit` checks in a window are allowed; every later check in
    /// the same window is denied with `remaining == 0`.
    ///
    /// # Errors
    /// Only store failures, and only when the store has no fallback.
    pub async fn check(
        &self,
        scope: &str,
        identity: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateDecision, StoreError> {
        let key = format!("{scope}:{identity}");
        let window = window.max(Duration::from_millis(1));
        let state = self.store.increment(&key, window).await?;

        let allowed = state.count <= u64::from(limit);
        let remaining = u64::from(limit).saturating_sub(state.count) as u32;
        let decision = RateDecision {
            allowed,
            remaining,
            reset_at_ms: state.reset_at_ms,
            limit,
        };

        metrics::record_rate_limit_decision(scope, allowed);
        if allowed {
            tracing::debug!(scope, identity, count = state.count, limit, "Rate limit check passed");
        } else {
            tracing::warn!(
                scope,
                identity,
                count = state.count,
                limit,
                backend = self.store.backend(),
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::clock::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter_at(start_ms: u64) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(start_ms);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let limiter = RateLimiter::new(Arc::new(LocalStore::with_clock(shared.clone())))
            .with_clock(shared);
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_remaining_decreases_to_zero_then_denies() {
        let (limiter, _clock) = limiter_at(0);
        let mut previous = u32::MAX;
        for _ in 0..5 {
            let d = limiter.check("login", "ip:1.2.3.4", 5, MINUTE).await.unwrap();
            assert!(d.allowed);
            assert!(d.remaining < previous);
            previous = d.remaining;
        }
        assert_eq!(previous, 0);

        let denied = limiter.check("login", "ip:1.2.3.4", 5, MINUTE).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at_ms, 60_000);
    }

    #[tokio::test]
    async fn test_fresh_window_after_reset() {
        let (limiter, clock) = limiter_at(0);
        for _ in 0..3 {
            limiter.check("login", "ip:9.9.9.9", 2, MINUTE).await.unwrap();
        }
        clock.advance(MINUTE);
        let d = limiter.check("login", "ip:9.9.9.9", 2, MINUTE).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
        assert_eq!(d.reset_at_ms, 120_000);
    }

    #[tokio::test]
    async fn test_scopes_do_not_share_counters() {
        let (limiter, _clock) = limiter_at(0);
        limiter.check("login", "ip:1.1.1.1", 1, MINUTE).await.unwrap();
        let d = limiter.check("signup", "ip:1.1.1.1", 1, MINUTE).await.unwrap();
        assert!(d.allowed);
    }

    #[tokio::test]
    async fn test_zero_limit_always_denies() {
        let (limiter, _clock) = limiter_at(0);
        let d = limiter.check("export", "ip:1.1.1.1", 0, MINUTE).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let d = RateDecision {
            allowed: false,
            remaining: 0,
            reset_at_ms: 10_500,
            limit: 1,
        };
        assert_eq!(d.retry_after(9_000), Duration::from_secs(2));
        assert_eq!(d.retry_after(10_500), Duration::from_secs(1));
        assert_eq!(d.retry_after(20_000), Duration::from_secs(1));

        let err = d.into_result(9_000).unwrap_err();
        assert_eq!(err.retry_after_secs, 2);
        assert_eq!(Violation::from(err).kind, ViolationKind::RateLimitExceeded);
    }
}
