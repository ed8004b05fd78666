//! Result cache: memoize fetched results for a fixed time window.
//!
//! Entries are keyed by query identity. A lookup returns the cached value
//! only while its age is below the caller's TTL; a failed fetch never
//! writes an entry.
//!
//! ## LRU eviction
//!
//! When the cache exceeds `max_entries`, expired entries are dropped first,
//! then the least-recently-accessed one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default maximum number of cached results before eviction.
const DEFAULT_MAX_ENTRIES: usize = 64;

/// Cache entry with metadata.
struct CacheEntry<V> {
    value: V,
    /// When the value was fetched.
    fetched_at: Instant,
    /// TTL of the call that filled the entry (used for eviction only).
    ttl: Duration,
    /// When the entry was last read (for LRU).
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// In-memory TTL cache for query results.
pub struct ResultCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    max_entries: usize,
    hits: u64,
    misses: u64,
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ResultCache<V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached value for `query_id` if younger than `ttl`.
    pub fn get(&mut self, query_id: &str, ttl: Duration) -> Option<V> {
        let entry = self.entries.get_mut(query_id)?;
        if !entry.is_fresh(ttl) {
            return None;
        }
        entry.last_accessed = Instant::now();
        Some(entry.value.clone())
    }

    /// Return the cached value, or call `fetch` and cache what it returns.
    ///
    /// `fetch` runs at most once per call. If it fails the error is returned
    /// unchanged and the cache is left as it was.
    pub fn get_or_fetch<F, E>(&mut self, query_id: &str, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(query_id, ttl) {
            self.hits += 1;
            tracing::debug!("cache hit: {query_id}");
            return Ok(value);
        }

        self.misses += 1;
        tracing::debug!("cache miss: {query_id}");
        let value = fetch()?;
        self.put(query_id, value.clone(), ttl);
        Ok(value)
    }

    fn put(&mut self, query_id: &str, value: V, ttl: Duration) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(query_id) {
            self.evict();
        }
        let now = Instant::now();
        self.entries.insert(
            query_id.to_string(),
            CacheEntry {
                value,
                fetched_at: now,
                ttl,
                last_accessed: now,
            },
        );
    }

    /// Age of a cached entry, fresh or not.
    pub fn age(&self, query_id: &str) -> Option<Duration> {
        self.entries.get(query_id).map(CacheEntry::age)
    }

    /// Remove one entry.
    pub fn invalidate(&mut self, query_id: &str) -> bool {
        self.entries.remove(query_id).is_some()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove entries whose own TTL has elapsed.
    pub fn cleanup_expired(&mut self) {
        self.entries.retain(|_, e| e.is_fresh(e.ttl));
    }

    fn evict(&mut self) {
        let before = self.entries.len();
        self.cleanup_expired();
        if self.entries.len() < before {
            return;
        }

        if let Some(lru) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone())
        {
            tracing::debug!("evicting LRU cache entry: {lru}");
            self.entries.remove(&lru);
        }
    }

    /// Number of entries (including stale ones not yet evicted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
