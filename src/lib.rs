//! Untrusted input defense layer.
//!
//! Three independent gateways that request handlers pass outside input
//! through before trusting it:
//! - [`rate_limit`]: how often a caller may act
//! - [`egress`]: which URLs the server may fetch from, and how
//! - [`content`]: what administrator-authored documents may contain
//!
//! The engines never call each other. [`http`] composes them into a small
//! API server, and [`policy`] holds the types they share.

pub mod config;
pub mod content;
pub mod egress;
pub mod http;
pub mod observability;
pub mod policy;
pub mod rate_limit;

pub use config::ShieldConfig;
pub use http::HttpServer;
pub use policy::{ValidationResult, Violation, ViolationKind};
