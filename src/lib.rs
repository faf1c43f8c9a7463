//! Load-balancing HTTP reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, connect info)
//!                        │
//!                        ▼
//!                     http::middleware
//!                        context → abuse filter → recovery → access log
//!                        → metrics → CORS → cache
//!                        │
//!                        ▼
//!                     proxy (round-robin backend, pooled HTTP(S) client)
//!                        │
//!                        ▼
//!                     Backend Server
//!
//!     Cross-cutting: config, observability (tracing + metrics),
//!                    lifecycle (startup, signals, shutdown)
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod proxy;

// Traffic management
pub mod cache;
pub mod load_balancer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
