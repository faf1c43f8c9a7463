//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check backend URLs are usable base URLs
//! - Validate value ranges (limits > 0, durations > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::load_balancer::backend::Backend;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one backend is required")]
    NoBackends,

    #[error("backend `{url}`: {reason}")]
    InvalidBackend { url: String, reason: String },

    #[error("{field} `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("transport.max_idle_per_backend ({per_backend}) exceeds transport.max_idle_connections ({total})")]
    IdlePoolMismatch { per_backend: usize, total: usize },

    #[error("unknown log level `{0}`")]
    UnknownLogLevel(String),

    #[error("unknown log format `{0}` (expected `text` or `json`)")]
    UnknownLogFormat(String),

    #[error("{field} `{value}` is not a valid header value")]
    InvalidHeaderValue { field: &'static str, value: String },
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for url in &config.backends {
        if let Err(e) = Backend::parse(url) {
            errors.push(ValidationError::InvalidBackend {
                url: url.clone(),
                reason: e.to_string(),
            });
        }
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    let filter = &config.abuse_filter;
    if filter.enabled {
        check_positive(&mut errors, "abuse_filter.request_limit", filter.request_limit as u64);
        check_positive(&mut errors, "abuse_filter.error_limit", filter.error_limit as u64);
        check_positive(&mut errors, "abuse_filter.window_secs", filter.window_secs);
        check_positive(&mut errors, "abuse_filter.ban_secs", filter.ban_secs);
        check_positive(&mut errors, "abuse_filter.cleanup_interval_secs", filter.cleanup_interval_secs);
    }

    let cache = &config.cache;
    if cache.enabled {
        check_positive(&mut errors, "cache.capacity", cache.capacity as u64);
        check_positive(&mut errors, "cache.ttl_secs", cache.ttl_secs);
    }

    let transport = &config.transport;
    check_positive(&mut errors, "transport.max_idle_connections", transport.max_idle_connections as u64);
    check_positive(&mut errors, "transport.max_idle_per_backend", transport.max_idle_per_backend as u64);
    check_positive(&mut errors, "transport.idle_timeout_secs", transport.idle_timeout_secs);
    check_positive(&mut errors, "transport.connect_timeout_secs", transport.connect_timeout_secs);
    check_positive(&mut errors, "transport.tls_handshake_timeout_secs", transport.tls_handshake_timeout_secs);
    check_positive(&mut errors, "transport.response_header_timeout_secs", transport.response_header_timeout_secs);
    check_positive(&mut errors, "transport.request_timeout_secs", transport.request_timeout_secs);
    if transport.max_idle_per_backend > transport.max_idle_connections {
        errors.push(ValidationError::IdlePoolMismatch {
            per_backend: transport.max_idle_per_backend,
            total: transport.max_idle_connections,
        });
    }

    if config.cors.enabled {
        check_header(&mut errors, "cors.allow_origin", &config.cors.allow_origin);
        check_header(&mut errors, "cors.allow_methods", &config.cors.allow_methods);
        check_header(&mut errors, "cors.allow_headers", &config.cors.allow_headers);
    }

    let observability = &config.observability;
    if let Err(e) = validate_log_level(&observability.log_level) {
        errors.push(e);
    }
    if !matches!(observability.log_format.as_str(), "text" | "json") {
        errors.push(ValidationError::UnknownLogFormat(observability.log_format.clone()));
    }
    if observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a log level, case-insensitively, against the supported set.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::UnknownLogLevel(level.to_string()))
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::NotPositive(field));
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_header(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if HeaderValue::from_str(value).is_err() {
        errors.push(ValidationError::InvalidHeaderValue {
            field,
            value: value.to_string(),
        });
    }
}
