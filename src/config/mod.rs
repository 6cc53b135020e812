//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, path from SHIELD_CONFIG) or defaults
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (SHIELD_API_KEY, SHIELD_REDIS_URL)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → shared via Arc to the server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Secrets can come from the environment so files need not hold them
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    EgressConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitBackend,
    RateLimitConfig, SecurityConfig, ShieldConfig,
};
pub use validation::{validate_config, ValidationError};
