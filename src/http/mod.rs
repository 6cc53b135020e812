//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (client IP recorded from the socket)
//!     → server.rs (request ID, trace span, timeout, body limit)
//!     → /health, or /v1:
//!         → rate_limit::middleware (per IP, then per IP + route)
//!         → auth.rs (bearer API key, constant-time compare)
//!         → handler (document gate, HTML rebuild, egress URL check)
//!     → response.rs (violation → 422 JSON with request ID)
//! ```

pub mod auth;
pub mod response;
pub mod server;

pub use auth::{require_api_key, ApiKeyAuth};
pub use response::ApiError;
pub use server::{build_router, AppState, HttpServer};
