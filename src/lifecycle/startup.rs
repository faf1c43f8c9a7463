//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Turn any construction failure into one fatal [`StartupError`]
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::cache::ResponseCache;
use crate::config::{CorsConfig, ProxyConfig};
use crate::load_balancer::{BackendPool, PoolError};
use crate::proxy::ProxyCore;
use crate::security::{AbuseFilter, AbuseFilterError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("backend pool: {0}")]
    Pool(#[from] PoolError),

    #[error("abuse filter: {0}")]
    AbuseFilter(#[from] AbuseFilterError),

    #[error("cache capacity must be greater than zero")]
    ZeroCacheCapacity,

    #[error("upstream TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid CORS header value for {field}: {value:?}")]
    InvalidCorsHeader { field: &'static str, value: String },
}

/// Values for the CORS response headers; `None` leaves a header alone.
#[derive(Debug, Clone, Default)]
pub struct CorsHeaders {
    pub allow_origin: Option<HeaderValue>,
    pub allow_methods: Option<HeaderValue>,
    pub allow_headers: Option<HeaderValue>,
}

impl CorsHeaders {
    pub fn from_config(config: &CorsConfig) -> Result<Self, StartupError> {
        if !config.enabled {
            return Ok(Self::default());
        }
        Ok(Self {
            allow_origin: Some(header_value("allow_origin", &config.allow_origin)?),
            allow_methods: Some(header_value("allow_methods", &config.allow_methods)?),
            allow_headers: Some(header_value("allow_headers", &config.allow_headers)?),
        })
    }
}

fn header_value(field: &'static str, value: &str) -> Result<HeaderValue, StartupError> {
    HeaderValue::from_str(value).map_err(|_| StartupError::InvalidCorsHeader {
        field,
        value: value.to_string(),
    })
}

/// Every long-lived component the request path needs.
#[derive(Debug, Clone)]
pub struct Components {
    pub proxy: Arc<ProxyCore>,
    pub filter: Option<Arc<AbuseFilter>>,
    pub cache: Option<Arc<ResponseCache>>,
    pub cors: CorsHeaders,
}

/// Build components leaf first: pool, filter, cache, proxy core.
pub fn build_components(config: &ProxyConfig) -> Result<Components, StartupError> {
    let pool = Arc::new(BackendPool::new(&config.backends)?);
    tracing::info!(
        backends = pool.len(),
        "Backend pool initialized"
    );

    let filter = if config.abuse_filter.enabled {
        let filter = AbuseFilter::new(&config.abuse_filter)?;
        tracing::info!(
            request_limit = config.abuse_filter.request_limit,
            error_limit = config.abuse_filter.error_limit,
            window_secs = config.abuse_filter.window_secs,
            ban_secs = config.abuse_filter.ban_secs,
            trusted = config.abuse_filter.trusted_clients.len(),
            "Abuse filter enabled"
        );
        Some(Arc::new(filter))
    } else {
        tracing::info!("Abuse filter disabled");
        None
    };

    let cache = if config.cache.enabled {
        let capacity =
            NonZeroUsize::new(config.cache.capacity).ok_or(StartupError::ZeroCacheCapacity)?;
        tracing::info!(
            capacity = config.cache.capacity,
            ttl_secs = config.cache.ttl_secs,
            "Response cache enabled"
        );
        Some(Arc::new(ResponseCache::new(capacity, config.cache.ttl())))
    } else {
        tracing::info!("Response cache disabled");
        None
    };

    let cors = CorsHeaders::from_config(&config.cors)?;
    let proxy = Arc::new(ProxyCore::new(&config.transport, pool)?);

    Ok(Components {
        proxy,
        filter,
        cache,
        cors,
    })
}
