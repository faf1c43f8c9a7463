//! Short-TTL response cache.
//!
//! # Data Flow
//! ```text
//! GET request
//!     → http/middleware/cache.rs (lookup by path + query)
//!         hit  → replay stored status, headers, body
//!         miss → proxy → buffer cacheable response → store.rs → client
//! ```
//!
//! # Design Decisions
//! - Entries are logically absent past the TTL and removed when found stale
//! - Capacity is bounded; the least recently used entry is evicted first
//! - Only bodies of known, bounded length are buffered; streams pass through

pub mod store;

pub use store::{CachedResponse, ResponseCache};
