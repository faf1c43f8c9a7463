//! Middleware stages, in chain order (outermost first).
//!
//! ```text
//! context.rs      request ID + client identity → RequestContext extension
//! abuse.rs        403 for banned clients, outcome feedback
//! recovery.rs     panic → 500
//! access_log.rs   per-request span + completion line
//! metrics.rs      request counter + latency histogram
//! (CORS)          tower-http SetResponseHeader layers, see server.rs
//! cache.rs        GET lookup / capture
//! ```

pub mod abuse;
pub mod access_log;
pub mod cache;
pub mod context;
pub mod metrics;
pub mod recovery;

pub use abuse::abuse_filter_middleware;
pub use access_log::access_log_middleware;
pub use cache::cache_middleware;
pub use context::request_context_middleware;
pub use self::metrics::metrics_middleware;
pub use recovery::recovery_middleware;
