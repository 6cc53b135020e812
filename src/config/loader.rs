//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::ShieldConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Path of the TOML file the server reads.
pub const CONFIG_PATH_ENV: &str = "SHIELD_CONFIG";
/// Overrides `security.api_key`.
pub const API_KEY_ENV: &str = "SHIELD_API_KEY";
/// Overrides `rate_limit.redis_url`.
pub const REDIS_URL_ENV: &str = "SHIELD_REDIS_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate a TOML file.
pub fn load_config(path: &Path) -> Result<ShieldConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ShieldConfig = toml::from_str(&content)?;
    finalize(config, |name| std::env::var(name).ok())
}

/// Load from `SHIELD_CONFIG` if set, otherwise start from defaults.
pub fn load_from_env() -> Result<ShieldConfig, ConfigError> {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => load_config(Path::new(&path)),
        None => finalize(ShieldConfig::default(), |name| std::env::var(name).ok()),
    }
}

/// Apply overrides from `lookup` and validate.
pub fn finalize<F>(mut config: ShieldConfig, lookup: F) -> Result<ShieldConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
        config.security.api_key = key;
    }
    if let Some(url) = lookup(REDIS_URL_ENV).filter(|v| !v.is_empty()) {
        config.rate_limit.redis_url = Some(url);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = ShieldConfig::default();
        config.security.api_key = "from-file".into();

        let config = finalize(
            config,
            env(&[(API_KEY_ENV, "from-env"), (REDIS_URL_ENV, "redis://cache:6379")]),
        )
        .unwrap();
        assert_eq!(config.security.api_key, "from-env");
        assert_eq!(config.rate_limit.redis_url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let mut config = ShieldConfig::default();
        config.security.api_key = "from-file".into();
        let config = finalize(config, env(&[(API_KEY_ENV, "")])).unwrap();
        assert_eq!(config.security.api_key, "from-file");
    }

    #[test]
    fn test_validation_errors_are_reported() {
        let err = finalize(ShieldConfig::default(), env(&[])).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors[0].field, "security.api_key"),
            other => panic!("expected validation error, got {other}"),
        }
    }
}
