//! Bounded LRU + TTL store for captured responses.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use lru::LruCache;
use tokio::time::Instant;

/// A fully buffered response, replayable any number of times.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: Instant,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Response cache keyed by request path and query.
///
/// A single mutex guards the LRU list; lookups mutate it too (recency
/// promotion, stale removal), so a read lock would not help.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, CachedResponse>>,
}

impl ResponseCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CachedResponse>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch a fresh entry. A stale entry is removed and reported absent.
    pub fn lookup(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl, now) => Some(entry.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite `key`. Returns true when another entry was
    /// evicted to make room.
    pub fn store(&self, key: String, entry: CachedResponse) -> bool {
        let mut entries = self.lock();
        match entries.push(key.clone(), entry) {
            Some((evicted, _)) => evicted != key,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}
