//! Outbound request guard (SSRF defense).
//!
//! # Data Flow
//! ```text
//! Handler needs third-party JSON:
//!     → url_policy.rs (scheme, exact host, userinfo, port, private names/IPs)
//!     → fetch.rs resolve (every resolved address must be public; client pinned to them)
//!     → fetch.rs execute (one request, deadline, no redirects, Accept: application/json)
//!         → status and Content-Type checks
//!         → bounded streaming read (max_bytes, declared length not trusted)
//!         → JSON parse into the caller's type
//! ```
//!
//! # Design Decisions
//! - Any URL violation aborts before network I/O
//! - Private address classes are refused even when the name is allowlisted,
//!   both lexically and after resolution
//! - Redirects are violations, not something to follow
//! - No retries; the caller owns retry policy

pub mod address;
pub mod fetch;
pub mod url_policy;

pub use fetch::{safe_fetch_json, EgressGuard, FetchViolation};
pub use url_policy::{assert_allowed_url, UrlViolation};
