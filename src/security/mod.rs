//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (resolve client identity)
//!     → abuse_filter.rs (admit, or reject with 403)
//!     → ... proxied ...
//!     → abuse_filter.rs (record response status)
//!
//! Outgoing request to backend:
//!     → headers.rs (strip hop-by-hop, append X-Forwarded-For)
//! ```
//!
//! # Design Decisions
//! - Rejected clients never reach the cache or a backend
//! - Trusted clients are exempt from every check

pub mod abuse_filter;
pub mod headers;

pub use abuse_filter::{AbuseFilter, AbuseFilterError, ClientState, FilterStats, Verdict};
pub use headers::ClientId;
