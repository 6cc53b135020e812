//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits, windows, timeouts > 0)
//! - Check that addresses parse and the Redis backend has a URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{RateLimitBackend, ShieldConfig};

/// One semantic problem, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration.
///
/// # Errors
/// Every [`ValidationError`] found, in field order.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.backend == RateLimitBackend::Redis
        && rate_limit.redis_url.as_deref().map_or(true, str::is_empty)
    {
        errors.push(ValidationError::new(
            "rate_limit.redis_url",
            "required when backend is redis",
        ));
    }
    if rate_limit.store_timeout_ms == 0 {
        errors.push(ValidationError::new("rate_limit.store_timeout_ms", "must be greater than 0"));
    }
    for (field, value) in [
        ("rate_limit.ip_limit", u64::from(rate_limit.ip_limit)),
        ("rate_limit.ip_window_secs", rate_limit.ip_window_secs),
        ("rate_limit.resource_limit", u64::from(rate_limit.resource_limit)),
        ("rate_limit.resource_window_secs", rate_limit.resource_window_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.egress.timeout_ms == 0 {
        errors.push(ValidationError::new("egress.timeout_ms", "must be greater than 0"));
    }
    if config.egress.max_bytes == 0 {
        errors.push(ValidationError::new("egress.max_bytes", "must be greater than 0"));
    }
    if config.egress.allowed_hosts.iter().any(|h| h.trim().is_empty()) {
        errors.push(ValidationError::new("egress.allowed_hosts", "entries must not be empty"));
    }

    if config.security.api_key.trim().is_empty() {
        errors.push(ValidationError::new(
            "security.api_key",
            "must be set (file or SHIELD_API_KEY)",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
