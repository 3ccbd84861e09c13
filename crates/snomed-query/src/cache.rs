//! Caching of resolved sub-expression id sets.
//!
//! The compiler resolves some sub-expressions (attribute types, refinement
//! values, ancestor lookups) to concept id sets before building the final
//! query. Those sets are cached per index generation, so a reimport never
//! serves a set computed against the previous release.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use roaring::RoaringTreemap;

use crate::config::CacheConfig;

/// Cache key: index generation plus normalized expression text.
type CacheKey = (u64, String);

#[derive(Debug, Clone)]
struct CacheEntry {
    ids: Arc<RoaringTreemap>,
    created_at: Instant,
}

impl CacheEntry {
    fn new(ids: Arc<RoaringTreemap>) -> Self {
        Self {
            ids,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Thread-safe LRU cache with TTL expiration for resolved id sets.
pub struct SetCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl SetCache {
    /// Creates a cache from its configuration. A capacity of zero is treated as one.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity(config.max_entries, config.ttl)
    }

    /// Creates a cache with custom capacity and TTL.
    pub fn with_capacity(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Gets a cached set, promoting it to most-recently-used. Expired
    /// entries are dropped on access.
    pub fn get(&self, generation: u64, expression: &str) -> Option<Arc<RoaringTreemap>> {
        let key = (generation, normalize_cache_key(expression));
        let mut cache = self.inner.lock();
        let entry = cache.get(&key)?;
        if entry.is_expired(self.ttl) {
            cache.pop(&key);
            return None;
        }
        Some(entry.ids.clone())
    }

    /// Stores a set.
    pub fn set(&self, generation: u64, expression: &str, ids: Arc<RoaringTreemap>) {
        let key = (generation, normalize_cache_key(expression));
        self.inner.lock().put(key, CacheEntry::new(ids));
    }

    /// Number of entries, possibly including expired ones.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Drops expired entries and entries of older generations.
    pub fn retain_generation(&self, generation: u64) {
        let mut cache = self.inner.lock();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(key, entry)| key.0 != generation || entry.is_expired(self.ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let cache = self.inner.lock();
        let total = cache.len();
        let expired = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl))
            .count();
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            valid_entries: total.saturating_sub(expired),
        }
    }
}

impl std::fmt::Debug for SetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Statistics about the cache state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of entries in the cache.
    pub total_entries: usize,
    /// Number of expired entries (not yet cleaned up).
    pub expired_entries: usize,
    /// Number of valid (non-expired) entries.
    pub valid_entries: usize,
}

/// Collapses whitespace runs so equivalent expressions share a key.
pub fn normalize_cache_key(ecl: &str) -> String {
    ecl.split_whitespace().collect::<Vec<_>>().join(" ")
}
