//! Backend pool management.
//!
//! # Responsibilities
//! - Own the fixed, ordered list of backends
//! - Apply the load balancing strategy to select one per request

use std::num::NonZeroUsize;
use std::sync::Arc;

use thiserror::Error;

use crate::load_balancer::{
    backend::{Backend, InvalidBackend},
    round_robin::RoundRobin,
    LoadBalancer,
};

/// Fatal errors when building the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("backend list is empty")]
    Empty,

    #[error("backend `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: InvalidBackend,
    },
}

/// The static set of backends plus the strategy that picks among them.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    len: NonZeroUsize,
    strategy: Box<dyn LoadBalancer>,
}

impl BackendPool {
    /// Build a round-robin pool from backend base URLs, in declaration order.
    pub fn new<S: AsRef<str>>(urls: &[S]) -> Result<Self, PoolError> {
        Self::with_strategy(urls, Box::new(RoundRobin::new()))
    }

    pub fn with_strategy<S: AsRef<str>>(
        urls: &[S],
        strategy: Box<dyn LoadBalancer>,
    ) -> Result<Self, PoolError> {
        let len = NonZeroUsize::new(urls.len()).ok_or(PoolError::Empty)?;

        let backends = urls
            .iter()
            .map(|url| {
                let url = url.as_ref();
                Backend::parse(url)
                    .map(Arc::new)
                    .map_err(|source| PoolError::InvalidUrl {
                        url: url.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            backends,
            len,
            strategy,
        })
    }

    /// Select the backend for the next request. Lock-free and allocation-free.
    pub fn select(&self) -> Arc<Backend> {
        let index = self.strategy.next_index(self.len) % self.len.get();
        self.backends[index].clone()
    }

    /// Return a list of all backends.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
