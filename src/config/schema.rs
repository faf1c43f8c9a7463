//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Backend base URLs (scheme + host), selected round-robin in this order.
    pub backends: Vec<String>,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Abuse filter (sliding-window rate limit and bans).
    pub abuse_filter: AbuseFilterConfig,

    /// Short-TTL response cache.
    pub cache: CacheConfig,

    /// Outbound transport: connection pool and timeouts.
    pub transport: TransportConfig,

    /// Cross-origin response headers.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Abuse filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AbuseFilterConfig {
    /// Enable the filter. When disabled every request is admitted untracked.
    pub enabled: bool,

    /// Client identities that are never tracked or banned.
    pub trusted_clients: Vec<String>,

    /// Use the first `X-Forwarded-For` hop as the client identity.
    pub trust_forwarded_for: bool,

    /// Requests inside one window that trigger a ban.
    pub request_limit: u32,

    /// Error responses (status >= 400) that trigger a ban.
    pub error_limit: u32,

    /// Sliding window length in seconds.
    pub window_secs: u64,

    /// Ban length in seconds.
    pub ban_secs: u64,

    /// Interval of the background sweep in seconds.
    pub cleanup_interval_secs: u64,
}

impl AbuseFilterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for AbuseFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trusted_clients: vec!["127.0.0.1".to_string()],
            trust_forwarded_for: true,
            request_limit: 100,
            error_limit: 10,
            window_secs: 60,
            ban_secs: 300,
            cleanup_interval_secs: 30,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching.
    pub enabled: bool,

    /// Maximum number of cached responses (LRU beyond this).
    pub capacity: usize,

    /// Time-to-live of a cached response in seconds.
    pub ttl_secs: u64,

    /// Larger bodies bypass the cache.
    pub max_body_bytes: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
            ttl_secs: 10,
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Outbound transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Idle pooled connections kept across all backends.
    pub max_idle_connections: usize,

    /// Idle pooled connections kept per backend.
    pub max_idle_per_backend: usize,

    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// TLS handshake timeout for https backends in seconds.
    pub tls_handshake_timeout_secs: u64,

    /// Time allowed between dispatch and response headers, in seconds.
    pub response_header_timeout_secs: u64,

    /// Global per-request deadline in seconds, covering every phase.
    pub request_timeout_secs: u64,
}

impl TransportConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_timeout_secs)
    }

    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_idle_connections: 200,
            max_idle_per_backend: 50,
            idle_timeout_secs: 90,
            connect_timeout_secs: 5,
            tls_handshake_timeout_secs: 10,
            response_header_timeout_secs: 10,
            request_timeout_secs: 15,
        }
    }
}

/// Cross-origin header injection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Add the headers below to responses that lack them.
    pub enabled: bool,

    /// `Access-Control-Allow-Origin` value.
    pub allow_origin: String,

    /// `Access-Control-Allow-Methods` value.
    pub allow_methods: String,

    /// `Access-Control-Allow-Headers` value.
    pub allow_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format (text, json).
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
