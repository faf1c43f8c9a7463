//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, HTTP/1.1 + HTTP/2, connect info)
//!     → middleware/ (context, abuse filter, recovery, access log,
//!                    metrics, CORS, cache)
//!     → proxy core (backend selection + forwarding)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use request::{RequestContext, RequestId, X_REQUEST_ID};
pub use server::{proxy_routes, with_middleware, AppState, HttpServer};
