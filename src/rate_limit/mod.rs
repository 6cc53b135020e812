//! Fixed-window rate limiting.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → middleware.rs (derive "ip:<addr>" and "ip+resource:<addr>|<res>" identities)
//!     → limiter.rs (one fixed-window check per key)
//!     → store.rs CounterStore::increment (atomic increment-and-read)
//!         → local.rs (mutex-guarded map, lazy expiry)
//!         → redis_store.rs (Lua INCR + PEXPIRE, cluster-wide)
//!         → fallback.rs (redis, or local when redis is unreachable)
//!     → allow, or 429 with Retry-After
//! ```
//!
//! # Design Decisions
//! - One key per check; dual-key policies are composed by the caller
//! - Store failure falls back to per-process counting when a fallback is
//!   configured: availability over global consistency. Deployments that need
//!   strict cluster-wide limits must treat Redis as load-bearing
//! - Without a fallback, store errors surface and the HTTP layer fails closed
//! - The client IP comes from the socket, never from forwarding headers

pub mod clock;
pub mod fallback;
pub mod limiter;
pub mod local;
pub mod middleware;
pub mod redis_store;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::FallbackStore;
pub use limiter::{RateDecision, RateLimitExceeded, RateLimiter};
pub use local::LocalStore;
pub use middleware::{rate_limit_middleware, RateLimitGate, RateLimitRule, X_REQUEST_ID};
pub use redis_store::{RedisStore, RedisStoreConfig};
pub use store::{CounterStore, StoreError, WindowState};
