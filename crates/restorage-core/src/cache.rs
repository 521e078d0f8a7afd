//! Bounded time-to-live cache.
//!
//! Entries expire a fixed duration after insertion. When the cache is full,
//! expired entries are purged first; if that leaves it full, the oldest tenth
//! of the entries is evicted in one pass, so a run of inserts past capacity
//! pays for a scan only once per batch.

use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

/// Fraction of the capacity evicted at once when no entry has expired.
const EVICTION_DIVISOR: usize = 10;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Concurrent cache with per-entry expiry and a capacity bound.
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> fmt::Debug for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    ///
    /// A capacity of zero disables caching.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    /// Look up a live entry.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(self.ttl) {
                return Some(entry.value.clone());
            }
        }
        let ttl = self.ttl;
        self.entries.remove_if(key, |_, e| e.is_expired(ttl));
        trace!(?key, "cache entry expired");
        None
    }

    /// Insert or replace an entry, restarting its lifetime.
    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.make_room();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for `key`, if any.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Number of entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| !e.is_expired(ttl));
        if self.entries.len() < self.capacity {
            return;
        }

        let batch = (self.capacity / EVICTION_DIVISOR).max(1);
        let mut ages: Vec<(Instant, K)> = self
            .entries
            .iter()
            .map(|e| (e.value().inserted_at, e.key().clone()))
            .collect();
        if ages.len() > batch {
            ages.select_nth_unstable_by_key(batch - 1, |(at, _)| *at);
            ages.truncate(batch);
        }
        trace!(evicted = ages.len(), "evicting oldest cache entries");
        for (_, key) in ages {
            self.entries.remove(&key);
        }
    }
}
