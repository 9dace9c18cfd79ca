//! Small bounded cache that maintains the six cache counters.
//!
//! Eviction is least-recently-used. A collision is counted when a new key
//! hashes to the same bucket (`hash % buckets`) as a key already stored.
//! `new` uses 2^32 buckets, so collisions only show up in tests that ask
//! for them through `with_buckets`.
//!
//! # Example
//!
//! ```rust,ignore
//! let cache = TestCache::shared(2);
//! cache.insert("a", "1");
//! cache.insert("b", "2");
//! assert_eq!(cache.get("a").as_deref(), Some("1"));
//! cache.insert("c", "3"); // evicts "b"
//! ```

use cache_metrics::{AtomicCacheCounters, CacheCounters, CacheMetricsSource};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// Bounded LRU cache of string pairs for tests.
#[derive(Debug)]
pub struct TestCache {
    capacity: usize,
    buckets: u64,
    inner: Mutex<TestCacheInner>,
    counters: AtomicCacheCounters,
}

#[derive(Debug, Default)]
struct TestCacheInner {
    entries: HashMap<String, String>,
    /// Front is least recently used.
    recency: VecDeque<String>,
}

impl TestCacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }
}

impl TestCache {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_buckets(capacity, 1 << 32)
    }

    /// Create a cache whose keys hash into `buckets` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `buckets` is zero.
    #[must_use]
    pub fn with_buckets(capacity: usize, buckets: u64) -> Self {
        assert!(capacity > 0, "TestCache capacity must be positive");
        assert!(buckets > 0, "TestCache bucket count must be positive");
        Self {
            capacity,
            buckets,
            inner: Mutex::new(TestCacheInner::default()),
            counters: AtomicCacheCounters::new(),
        }
    }

    /// `new` wrapped in an `Arc`, ready for `instrument_cache`.
    #[must_use]
    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Insert or update `key`. Returns `true` if an entry was evicted.
    pub fn insert(&self, key: &str, value: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.counters.record_insert();

        if inner.entries.contains_key(key) {
            inner.entries.insert(key.to_string(), value.to_string());
            inner.touch(key);
            return false;
        }

        let bucket = self.bucket(key);
        if inner.entries.keys().any(|k| self.bucket(k) == bucket) {
            self.counters.record_collision();
        }

        let mut evicted = false;
        if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.recency.pop_front() {
                inner.entries.remove(&oldest);
                self.counters.record_eviction();
                evicted = true;
            }
        }

        inner.entries.insert(key.to_string(), value.to_string());
        inner.recency.push_back(key.to_string());
        evicted
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get(key).cloned() {
            Some(value) => {
                self.counters.record_hit();
                inner.touch(key);
                Some(value)
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.remove(key).is_none() {
            return false;
        }
        inner.recency.retain(|k| k != key);
        self.counters.record_removal();
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket(&self, key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() % self.buckets
    }
}

impl CacheMetricsSource for TestCache {
    fn counters(&self) -> CacheCounters {
        self.counters.snapshot()
    }
}
