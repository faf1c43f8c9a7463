//! Round-robin load balancing strategy.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal counter to rotate through backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_index(&self, len: NonZeroUsize) -> usize {
        // fetch_add hands every caller a distinct pre-increment value, so
        // concurrent callers can never share or skip a slot.
        self.counter.fetch_add(1, Ordering::Relaxed) % len.get()
    }
}
