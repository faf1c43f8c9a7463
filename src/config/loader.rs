//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

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

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            backends = ["http://10.0.0.1:8000", "https://api.example.com"]

            [listener]
            bind_address = "127.0.0.1:8443"

            [abuse_filter]
            trusted_clients = []
            request_limit = 5
            window_secs = 1

            [cache]
            enabled = false

            [transport]
            request_timeout_secs = 3

            [observability]
            log_format = "json"
            metrics_enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.listener.bind_address, "127.0.0.1:8443");
        assert!(config.abuse_filter.trusted_clients.is_empty());
        assert_eq!(config.abuse_filter.request_limit, 5);
        // Unset fields keep their defaults.
        assert_eq!(config.abuse_filter.error_limit, 10);
        assert!(!config.cache.enabled);
        assert_eq!(config.transport.request_timeout_secs, 3);
        assert_eq!(config.transport.max_idle_per_backend, 50);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("backends = 42").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error_lists_problems() {
        let err = parse_config("backends = []").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation failed: at least one backend is required"
        );
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/proxy.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.abuse_filter.request_limit, 100);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
