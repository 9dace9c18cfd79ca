//! Cache counter snapshot and the capability trait instrumented caches implement.
//!
//! The registry never mutates a cache; it only reads a [`CacheCounters`]
//! snapshot through [`CacheMetricsSource::counters`]. Concrete cache types
//! are wired in through small adapters implementing that trait, usually by
//! embedding an [`AtomicCacheCounters`] block.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time values of the six cache counters.
///
/// Every field is monotonically non-decreasing for the lifetime of the cache
/// that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    /// Lookups that found the key.
    pub hits: u64,
    /// Lookups that did not find the key.
    pub misses: u64,
    /// Successful inserts.
    pub inserts: u64,
    /// Entries evicted to make room for new ones.
    pub evictions: u64,
    /// Inserts that landed on an occupied slot for a different key.
    pub collisions: u64,
    /// Explicit removals.
    pub removals: u64,
}

/// A cache that can report its counters.
///
/// Implementations must be safe to read concurrently with the cache's normal
/// use; the metrics sink calls this from its own sampling context.
pub trait CacheMetricsSource: Send + Sync {
    /// Current counter values.
    fn counters(&self) -> CacheCounters;
}

/// Lock-free counter block for cache adapters.
///
/// Relaxed ordering is sufficient: counters are observational and each
/// field is read independently.
#[derive(Debug, Default)]
pub struct AtomicCacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    collisions: AtomicU64,
    removals: AtomicU64,
}

impl AtomicCacheCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all six counters.
    #[must_use]
    pub fn snapshot(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetricsSource for AtomicCacheCounters {
    fn counters(&self) -> CacheCounters {
        self.snapshot()
    }
}
