//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All engines produce:
//!     → tracing events (structured fields, never raw documents or secrets)
//!     → metrics.rs counters (decisions, fallbacks, violations)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every log line of a request via the trace span
//! - Metrics are cheap (atomic increments) and recorded even when no
//!   exporter is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
