//! Counter store port.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

/// Fixed-window counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Checks seen in the current window, including the one that produced
    /// this state.
    pub count: u64,
    /// Window start, Unix epoch milliseconds.
    pub window_start_ms: u64,
    /// Instant the window closes, Unix epoch milliseconds.
    pub reset_at_ms: u64,
}

impl WindowState {
    /// First check of a new window.
    pub fn open(now_ms: u64, window: Duration) -> Self {
        Self {
            count: 1,
            window_start_ms: now_ms,
            reset_at_ms: now_ms.saturating_add(window.as_millis() as u64),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.reset_at_ms
    }
}

/// Errors raised by a counter backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or refused the command.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer within the per-operation budget.
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),

    /// Backend answered with something other than (count, ttl).
    #[error("counter store returned an invalid reply: {0}")]
    InvalidReply(String),
}

/// Atomic fixed-window counter storage.
///
/// `increment` must create, expire and increment the window for `key` as a
/// single atomic step; a read-then-write implementation loses updates under
/// concurrency and lets callers exceed their limit.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Count one check against `key` and return the resulting window.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowState, StoreError>;

    /// Short backend name for logs and metrics.
    fn backend(&self) -> &'static str;
}
