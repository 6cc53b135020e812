//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every section
//! has defaults so a minimal file (or none) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::content::MAX_DOCUMENT_CHARS;

/// Root configuration for the shield server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address, request bounds).
    pub listener: ListenerConfig,

    /// Rate limiter backend and per-route limits.
    pub rate_limit: RateLimitConfig,

    /// Outbound fetch allowlist and ceilings.
    pub egress: EgressConfig,

    /// API key and violation disclosure.
    pub security: SecurityConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted request body. The default fits the largest document
    /// the content gate accepts, at four bytes per character.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 4 * MAX_DOCUMENT_CHARS,
        }
    }
}

/// Where rate limit counters live.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// In-process map; limits are per instance.
    #[default]
    Local,
    /// Shared Redis counters with local fallback.
    Redis,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub backend: RateLimitBackend,

    /// Redis URL, required for the redis backend.
    pub redis_url: Option<String>,

    /// Prefix for Redis counter keys.
    pub key_prefix: String,

    /// Budget for one Redis round-trip before falling back, in milliseconds.
    pub store_timeout_ms: u64,

    /// Local map size that triggers a sweep of expired windows.
    pub local_sweep_threshold: usize,

    /// Requests per client IP per window.
    pub ip_limit: u32,
    pub ip_window_secs: u64,

    /// Requests per client IP and route per window.
    pub resource_limit: u32,
    pub resource_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: RateLimitBackend::Local,
            redis_url: None,
            key_prefix: "input-shield:rl:".to_string(),
            store_timeout_ms: 250,
            local_sweep_threshold: 100_000,
            ip_limit: 120,
            ip_window_secs: 60,
            resource_limit: 30,
            resource_window_secs: 60,
        }
    }
}

/// Egress guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EgressConfig {
    /// Exact hostnames the server may fetch from.
    pub allowed_hosts: Vec<String>,

    /// Whole-fetch deadline in milliseconds.
    pub timeout_ms: u64,

    /// Largest accepted response body.
    pub max_bytes: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            timeout_ms: 5_000,
            max_bytes: 1024 * 1024,
        }
    }
}

/// Security configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer token required on `/v1` routes.
    pub api_key: String,

    /// Include violation detail in client responses. Non-production only.
    pub expose_violation_details: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            expose_violation_details: false,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("api_key", &"[redacted]")
            .field("expose_violation_details", &self.expose_violation_details)
            .finish()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Pretty,
    /// One JSON object per event, for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub log_filter: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "input_shield=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ShieldConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.rate_limit.backend, RateLimitBackend::Local);
        assert_eq!(config.egress.timeout_ms, 5_000);
        assert!(!config.security.expose_violation_details);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_default_body_limit_fits_largest_document() {
        let config = ListenerConfig::default();
        let largest = "\u{1F600}".repeat(MAX_DOCUMENT_CHARS);
        assert!(largest.len() <= config.max_body_bytes);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config: ShieldConfig = toml::from_str(
            r#"
            [rate_limit]
            backend = "redis"
            redis_url = "redis://127.0.0.1:6379"
            ip_limit = 10

            [egress]
            allowed_hosts = ["api.example.com"]

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.backend, RateLimitBackend::Redis);
        assert_eq!(config.rate_limit.ip_limit, 10);
        assert_eq!(config.rate_limit.ip_window_secs, 60);
        assert_eq!(config.egress.allowed_hosts, vec!["api.example.com"]);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let security = SecurityConfig {
            api_key: "super-secret".into(),
            expose_violation_details: false,
        };
        let printed = format!("{security:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("redacted"));
    }
}
