//! Bounded LRU cache with optional per-entry expiry.
//!
//! Expiry is lazy: an expired entry is only removed when it is read, or when
//! [`LruCache::cleanup_expired`] sweeps the whole store. Eviction on insert
//! looks at recency alone, so an untouched expired entry may outlive a fresher
//! one until the next sweep.

use std::hash::Hash;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

/// A cached value with its creation time and optional time-to-live.
#[derive(Debug, Clone)]
pub struct CachedEntry<V> {
    /// The cached value.
    pub value: V,
    /// When the entry was stored.
    pub created_at: Instant,
    /// How long the entry stays valid; `None` never expires.
    pub ttl: Option<Duration>,
}

impl<V> CachedEntry<V> {
    /// Creates an entry stamped with the current time.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Returns `true` if a TTL was set and has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.ttl
            .is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups of unknown or expired keys.
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before the first lookup.
    pub hit_rate: f64,
    /// Capacity.
    pub max_size: usize,
    /// Current number of entries (expired ones included until purged).
    pub size: usize,
}

/// Bounded key/value store with least-recently-used eviction.
///
/// Entries are kept in recency order: index 0 is the eviction candidate, the
/// last index the most recently read or written key.
#[derive(Debug)]
pub struct LruCache<K, V> {
    entries: IndexMap<K, CachedEntry<V>>,
    max_size: usize,
    default_ttl: Option<Duration>,
    hits: u64,
    misses: u64,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    /// Creates a cache holding at most `max_size` entries.
    ///
    /// `default_ttl` applies to [`LruCache::set`]; a cache with
    /// `max_size == 0` stores nothing.
    #[must_use]
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            entries: IndexMap::with_capacity(max_size.min(1024)),
            max_size,
            default_ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn set(&mut self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Stores `value` under `key` with an explicit TTL (`None` never expires).
    ///
    /// Overwriting a key refreshes its timestamp and recency. Inserting a new
    /// key into a full cache evicts the least recently used entry first.
    pub fn set_with_ttl(&mut self, key: K, value: V, ttl: Option<Duration>) {
        if self.max_size == 0 {
            return;
        }
        let entry = CachedEntry::new(value, ttl);
        if let Some(index) = self.entries.get_index_of(&key) {
            self.entries[index] = entry;
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
            return;
        }
        if self.entries.len() >= self.max_size {
            self.entries.shift_remove_index(0);
            tracing::debug!(max_size = self.max_size, "Evicted least recently used cache entry");
        }
        self.entries.insert(key, entry);
    }

    /// Looks up `key`.
    ///
    /// A hit promotes the entry to most recently used. Unknown and expired
    /// keys count as misses, and expired entries are removed.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Some(index) = self.entries.get_index_of(key) else {
            self.misses += 1;
            return None;
        };
        if self.entries[index].is_expired() {
            self.entries.shift_remove_index(index);
            self.misses += 1;
            tracing::debug!("Dropped expired cache entry on read");
            return None;
        }
        self.hits += 1;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, entry)| &entry.value)
    }

    /// Removes `key`; returns `true` if it was present.
    pub fn delete(&mut self, key: &K) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    /// Removes every entry and resets the hit/miss counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
        tracing::debug!("Cache cleared");
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// Counters and the recency order of the survivors are unaffected.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `key` is stored, expired or not. Does not touch
    /// recency or counters.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the current statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                self.hits as f64 / total as f64
            },
            max_size: self.max_size,
            size: self.entries.len(),
        }
    }
}

/// An [`LruCache`] shared between concurrent callers.
///
/// Every operation runs under one lock around the whole cache.
#[derive(Debug)]
pub struct SharedCache<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> SharedCache<K, V> {
    /// Creates a shared cache; see [`LruCache::new`].
    #[must_use]
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_size, default_ttl)),
        }
    }

    /// See [`LruCache::set`].
    pub fn set(&self, key: K, value: V) {
        self.inner.lock().set(key, value);
    }

    /// See [`LruCache::set_with_ttl`].
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) {
        self.inner.lock().set_with_ttl(key, value, ttl);
    }

    /// See [`LruCache::get`]; returns a clone of the value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// See [`LruCache::delete`].
    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().delete(key)
    }

    /// See [`LruCache::clear`].
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// See [`LruCache::cleanup_expired`].
    pub fn cleanup_expired(&self) -> usize {
        self.inner.lock().cleanup_expired()
    }

    /// See [`LruCache::stats`].
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn lru_eviction_respects_reads() {
        let mut cache = LruCache::new(3, None);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.get(&"b"), Some(&2));
        cache.set("d", 4);

        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.get(&"d"), Some(&4));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut cache = LruCache::new(2, None);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.len(), 2);
        cache.set("c", 3);
        // "b" became the oldest once "a" was rewritten.
        assert!(!cache.contains_key(&"b"));
        assert_eq!(cache.get(&"a"), Some(&10));
    }

    #[test]
    fn ttl_expiry_is_lazy() {
        let mut cache = LruCache::new(4, None);
        cache.set_with_ttl("short", 1, Some(Duration::from_millis(20)));
        cache.set("forever", 2);
        assert_eq!(cache.get(&"short"), Some(&1));

        thread::sleep(Duration::from_millis(40));
        assert!(cache.contains_key(&"short"));
        assert_eq!(cache.get(&"short"), None);
        assert!(!cache.contains_key(&"short"));
        assert_eq!(cache.get(&"forever"), Some(&2));
    }

    #[test]
    fn default_ttl_applies_to_set() {
        let mut cache = LruCache::new(4, Some(Duration::from_millis(10)));
        cache.set("k", 1);
        cache.set_with_ttl("pinned", 2, None);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.get(&"pinned"), Some(&2));
    }

    #[test]
    fn cleanup_keeps_counters() {
        let mut cache = LruCache::new(4, None);
        cache.set_with_ttl("x", 1, Some(Duration::ZERO));
        cache.set("y", 2);
        let _ = cache.get(&"y");
        thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.cleanup_expired(), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn stats_and_clear() {
        let mut cache = LruCache::new(8, None);
        cache.set("a", 1);
        assert!(cache.get(&"a").is_some());
        assert!(cache.get(&"missing").is_none());
        let stats = cache.stats();
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.max_size, 8);

        cache.clear();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (0, 0, 0));
        assert!(stats.hit_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn delete_reports_presence() {
        let mut cache = LruCache::new(2, None);
        cache.set("a", 1);
        assert!(cache.delete(&"a"));
        assert!(!cache.delete(&"a"));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = LruCache::new(0, None);
        cache.set("a", 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn shared_cache_across_threads() {
        let cache = std::sync::Arc::new(SharedCache::new(64, None));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = std::sync::Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..10 {
                        cache.set(format!("{t}-{i}"), i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().size, 40);
        assert_eq!(cache.get(&"2-7".to_string()), Some(7));
    }
}
