//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy core needs a destination
//!     → pool.rs (fixed, ordered backend list)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!     → backend.rs (scheme + authority to rewrite the request with)
//! ```
//!
//! # Design Decisions
//! - Backend membership is static; the pool is built once and never mutated
//! - The strategy only hands out indices; the pool owns the backends
//! - Selection is a single atomic increment, no locks

use std::fmt::Debug;
use std::num::NonZeroUsize;

pub mod backend;
pub mod pool;
pub mod round_robin;

pub use backend::{Backend, InvalidBackend};
pub use pool::{BackendPool, PoolError};
pub use round_robin::RoundRobin;

/// Backend selection strategy.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Index in `0..len` of the backend that serves the next request.
    fn next_index(&self, len: NonZeroUsize) -> usize;
}
