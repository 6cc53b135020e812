//! In-process counter store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::rate_limit::clock::{Clock, SystemClock};
use crate::rate_limit::store::{CounterStore, StoreError, WindowState};

/// Entry count above which expired windows are swept.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 100_000;

/// Minimum spacing between sweeps so a flood of fresh keys cannot turn every
/// check into a full scan.
const SWEEP_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Default)]
struct Windows {
    entries: HashMap<String, WindowState>,
    next_sweep_ms: u64,
}

/// Mutex-guarded map of fixed windows.
///
/// Expired windows are replaced lazily on their next check. When the map grows
/// past the sweep threshold, expired entries are dropped, at most once per
/// second, keeping memory proportional to the keys seen within one window.
#[derive(Debug, Clone)]
pub struct LocalStore {
    windows: Arc<Mutex<Windows>>,
    clock: Arc<dyn Clock>,
    sweep_threshold: usize,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Arc::new(Mutex::new(Windows::default())),
            clock,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }

    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold.max(1);
        self
    }

    /// Number of tracked windows, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous core of [`CounterStore::increment`].
    pub fn increment_now(&self, key: &str, window: Duration) -> WindowState {
        let now = self.clock.now_ms();
        let mut windows = self.lock();

        if windows.entries.len() >= self.sweep_threshold && now >= windows.next_sweep_ms {
            let before = windows.entries.len();
            windows.entries.retain(|_, state| !state.is_expired(now));
            windows.next_sweep_ms = now.saturating_add(SWEEP_INTERVAL_MS);
            tracing::debug!(
                swept = before - windows.entries.len(),
                remaining = windows.entries.len(),
                "Swept expired rate limit windows"
            );
        }

        match windows.entries.get_mut(key) {
            Some(state) if !state.is_expired(now) => {
                state.count = state.count.saturating_add(1);
                *state
            }
            Some(state) => {
                *state = WindowState::open(now, window);
                *state
            }
            None => {
                let state = WindowState::open(now, window);
                windows.entries.insert(key.to_string(), state);
                state
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Windows> {
        // Window state stays consistent even if a holder panicked.
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for LocalStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowState, StoreError> {
        Ok(self.increment_now(key, window))
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::clock::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);

    fn store_at(start_ms: u64) -> (LocalStore, ManualClock) {
        let clock = ManualClock::new(start_ms);
        (LocalStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_counts_within_window() {
        let (store, _clock) = store_at(10_000);
        assert_eq!(store.increment_now("login:ip:1.2.3.4", MINUTE).count, 1);
        assert_eq!(store.increment_now("login:ip:1.2.3.4", MINUTE).count, 2);
        let state = store.increment_now("login:ip:1.2.3.4", MINUTE);
        assert_eq!(state.count, 3);
        assert_eq!(state.window_start_ms, 10_000);
        assert_eq!(state.reset_at_ms, 70_000);
    }

    #[test]
    fn test_keys_are_independent() {
        let (store, _clock) = store_at(0);
        store.increment_now("a", MINUTE);
        store.increment_now("a", MINUTE);
        assert_eq!(store.increment_now("b", MINUTE).count, 1);
    }

    #[test]
    fn test_window_resets_at_boundary() {
        let (store, clock) = store_at(0);
        store.increment_now("k", MINUTE);
        store.increment_now("k", MINUTE);

        clock.advance(Duration::from_millis(59_999));
        assert_eq!(store.increment_now("k", MINUTE).count, 3);

        clock.advance(Duration::from_millis(1));
        let state = store.increment_now("k", MINUTE);
        assert_eq!(state.count, 1);
        assert_eq!(state.window_start_ms, 60_000);
        assert_eq!(state.reset_at_ms, 120_000);
    }

    #[test]
    fn test_sweep_drops_expired_windows() {
        let (store, clock) = store_at(0);
        let store = store.with_sweep_threshold(3);
        store.increment_now("a", Duration::from_secs(1));
        store.increment_now("b", Duration::from_secs(1));
        store.increment_now("c", MINUTE);
        assert_eq!(store.len(), 3);

        clock.advance(Duration::from_secs(2));
        store.increment_now("d", MINUTE);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let (store, _clock) = store_at(0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        store.increment_now("shared", MINUTE);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.increment_now("shared", MINUTE).count, 4_001);
    }
}
