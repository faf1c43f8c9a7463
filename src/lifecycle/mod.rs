//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, via HttpServer::new):
//!     Validated config → backend pool → abuse filter → cache → proxy core
//!     Any error is fatal; nothing is served until every part is built.
//!
//! Run (HttpServer::run):
//!     Spawn ban sweep → serve listener
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!     → server stops accepting and drains in-flight requests
//!     → ban sweep exits its loop
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_components, Components, CorsHeaders, StartupError};
