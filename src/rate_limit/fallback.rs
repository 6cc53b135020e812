//! Primary store with an in-process fallback.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::rate_limit::local::LocalStore;
use crate::rate_limit::store::{CounterStore, StoreError, WindowState};

/// Routes checks to `primary` and answers from `local` while it fails.
///
/// Under fallback each process counts on its own, so a caller spread across
/// N instances can get up to N times its limit. This is intentional: a
/// counter outage must not take the application down with it.
///
/// Entering and leaving degraded mode is logged once per transition.
#[derive(Debug)]
pub struct FallbackStore {
    primary: Arc<dyn CounterStore>,
    local: LocalStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn CounterStore>, local: LocalStore) -> Self {
        Self {
            primary,
            local,
            degraded: AtomicBool::new(false),
        }
    }

    /// True while the last primary call failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn note_failure(&self, error: &StoreError) {
        metrics::record_rate_limit_fallback(self.primary.backend());
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                backend = self.primary.backend(),
                error = %error,
                "Counter store failed, enforcing limits per process until it recovers"
            );
        } else {
            tracing::debug!(backend = self.primary.backend(), error = %error, "Counter store still failing");
        }
    }

    fn note_success(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!(backend = self.primary.backend(), "Counter store recovered");
        }
    }
}

#[async_trait]
impl CounterStore for FallbackStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowState, StoreError> {
        match self.primary.increment(key, window).await {
            Ok(state) => {
                self.note_success();
                Ok(state)
            }
            Err(error) => {
                self.note_failure(&error);
                Ok(self.local.increment_now(key, window))
            }
        }
    }

    fn backend(&self) -> &'static str {
        if self.is_degraded() {
            "local-fallback"
        } else {
            self.primary.backend()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::clock::ManualClock;

    /// Primary that fails until switched on.
    #[derive(Debug, Default)]
    struct FlakyStore {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl CounterStore for FlakyStore {
        async fn increment(&self, _key: &str, window: Duration) -> Result<WindowState, StoreError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(WindowState::open(0, window))
            } else {
                Err(StoreError::Unavailable("connection refused".into()))
            }
        }

        fn backend(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_local_counts() {
        let primary = Arc::new(FlakyStore::default());
        let local = LocalStore::with_clock(Arc::new(ManualClock::new(0)));
        let store = FallbackStore::new(primary, local);

        let window = Duration::from_secs(60);
        assert_eq!(store.increment("k", window).await.unwrap().count, 1);
        assert_eq!(store.increment("k", window).await.unwrap().count, 2);
        assert!(store.is_degraded());
        assert_eq!(store.backend(), "local-fallback");
    }

    #[tokio::test]
    async fn test_returns_to_primary_after_recovery() {
        let primary = Arc::new(FlakyStore::default());
        let store = FallbackStore::new(primary.clone(), LocalStore::new());
        let window = Duration::from_secs(60);

        store.increment("k", window).await.unwrap();
        assert!(store.is_degraded());

        primary.healthy.store(true, Ordering::SeqCst);
        let state = store.increment("k", window).await.unwrap();
        assert_eq!(state.window_start_ms, 0);
        assert!(!store.is_degraded());
        assert_eq!(store.backend(), "flaky");
    }
}
