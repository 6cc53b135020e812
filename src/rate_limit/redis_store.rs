//! Redis-backed counter store.
//!
//! Shares window state across every instance pointed at the same Redis.
//!
//! ## Atomicity
//!
//! Each check runs one Lua script. Redis executes scripts atomically, so the
//! increment, the TTL assignment on the first increment and the TTL read can
//! not interleave with another instance's check:
//!
//! ```text
//! INCR key            -> count
//! count == 1 ?        -> PEXPIRE key window_ms
//! PTTL key            -> remaining window
//! ```
//!
//! The window lives exactly as long as the key, so expiry is Redis's job and
//! no sweep is needed.
//!
//! ## Failure behaviour
//!
//! Every command is bounded by `op_timeout`. Errors and timeouts are returned
//! as [`StoreError`]; wrap the store in a
//! [`FallbackStore`](crate::rate_limit::FallbackStore) to keep serving when
//! Redis is down.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult, Script};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;

use crate::rate_limit::clock::{Clock, SystemClock};
use crate::rate_limit::store::{CounterStore, StoreError, WindowState};

static INCREMENT_WINDOW: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
",
    )
});

/// Configuration for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Prefix for every counter key (default: "input-shield:rl:").
    pub key_prefix: String,
    /// Budget for one increment round-trip (default: 250ms).
    pub op_timeout: Duration,
    /// Budget for the initial connection (default: 2s).
    pub connect_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "input-shield:rl:".to_string(),
            op_timeout: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Cluster-wide fixed-window counters in Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect with default configuration.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or Redis cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect with custom configuration.
    ///
    /// # Errors
    /// Returns error if the URL is invalid, or Redis cannot be reached within
    /// `connect_timeout`.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let connection = match timeout(config.connect_timeout, ConnectionManager::new(client)).await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(StoreError::Unavailable(e.to_string())),
            Err(_) => return Err(StoreError::Timeout(config.connect_timeout)),
        };

        tracing::info!(key_prefix = %config.key_prefix, "Connected to Redis counter store");

        Ok(Self {
            connection,
            config,
            clock: Arc::new(SystemClock),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowState, StoreError> {
        let window_ms = window.as_millis().max(1) as u64;
        let mut connection = self.connection.clone();
        let mut invocation = INCREMENT_WINDOW.key(self.key(key));
        invocation.arg(window_ms);

        let reply: RedisResult<(i64, i64)> =
            match timeout(self.config.op_timeout, invocation.invoke_async(&mut connection)).await {
                Ok(reply) => reply,
                Err(_) => return Err(StoreError::Timeout(self.config.op_timeout)),
            };
        let (count, ttl_ms) = reply.map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if count < 1 || ttl_ms < 0 {
            return Err(StoreError::InvalidReply(format!(
                "count={count} ttl_ms={ttl_ms}"
            )));
        }

        let reset_at_ms = self.clock.now_ms().saturating_add(ttl_ms as u64);
        Ok(WindowState {
            count: count as u64,
            window_start_ms: reset_at_ms.saturating_sub(window_ms),
            reset_at_ms,
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.key_prefix, "input-shield:rl:");
        assert_eq!(config.op_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_invalid_url_is_unavailable() {
        let err = RedisStore::connect("not a redis url").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
