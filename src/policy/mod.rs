//! Shared policy and result types.
//!
//! # Data Flow
//! ```text
//! Call site builds an immutable policy:
//!     → EgressPolicy (allowed hosts, deadline, byte ceiling)
//!     → SanitizationPolicy (tag / attribute / scheme allowlists)
//!
//! Engines report failures as typed errors:
//!     → UrlViolation / FetchViolation / DocumentViolation / RateLimitExceeded
//!     → each maps onto a ViolationKind
//!     → Violation { kind, detail } for callers that handle all engines alike
//! ```
//!
//! # Design Decisions
//! - Policies are built by the caller, never derived from request input
//! - Every violation carries a stable kind; detail is optional and is only
//!   shown to clients when diagnostics are explicitly enabled
//! - Secrets are compared with `constant_time_eq`, never with `==`

pub mod compare;
pub mod egress;
pub mod sanitization;
pub mod violation;

pub use compare::constant_time_eq;
pub use egress::EgressPolicy;
pub use sanitization::SanitizationPolicy;
pub use violation::{ValidationResult, Violation, ViolationKind};
