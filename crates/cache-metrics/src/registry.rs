//! Registry of named cache handles.
//!
//! The registry holds non-owning handles: the caller keeps the cache alive
//! through its own `Arc`, and an entry whose cache has been dropped is
//! skipped during iteration and pruned on the next successful `add`.
//!
//! Names are unique among live entries. A second `add` under a name that is
//! still live fails and leaves the registry unchanged.

use crate::counters::CacheMetricsSource;
use crate::errors::InstrumentationError;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::debug;

/// One registered cache.
#[derive(Clone)]
struct RegistryEntry {
    name: String,
    handle: Weak<dyn CacheMetricsSource>,
}

impl RegistryEntry {
    fn is_live(&self) -> bool {
        self.handle.strong_count() > 0
    }
}

/// Thread-safe table of `(name, cache)` pairs in insertion order.
#[derive(Default)]
pub struct CacheRegistry {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl CacheRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentationError::DuplicateName`] if a live cache is
    /// already registered under `name`.
    pub fn add(
        &self,
        handle: Weak<dyn CacheMetricsSource>,
        name: &str,
    ) -> Result<(), InstrumentationError> {
        let mut entries = self.write();
        if entries
            .iter()
            .any(|entry| entry.name == name && entry.is_live())
        {
            return Err(InstrumentationError::DuplicateName(name.to_string()));
        }

        entries.retain(RegistryEntry::is_live);
        entries.push(RegistryEntry {
            name: name.to_string(),
            handle,
        });
        debug!(cache_name = %name, registered = entries.len(), "Cache added to registry");
        Ok(())
    }

    /// Remove the entry named `name`. Returns whether an entry was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        before != entries.len()
    }

    /// Visit every live entry in insertion order.
    ///
    /// The entry list is copied under the read lock and the lock is released
    /// before the first visit, so `visitor` may call back into the registry.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &dyn CacheMetricsSource),
    {
        let snapshot = self.read().clone();
        for entry in &snapshot {
            if let Some(cache) = entry.handle.upgrade() {
                visitor(&entry.name, cache.as_ref());
            }
        }
    }

    /// Names of live entries in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|entry| entry.is_live())
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().iter().filter(|entry| entry.is_live()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose cache no longer exists. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(RegistryEntry::is_live);
        before - entries.len()
    }

    /// Remove every entry.
    pub fn reset(&self) {
        self.write().clear();
    }

    // A panic inside a visitor never runs under these locks, so a poisoned
    // lock still guards a consistent Vec.
    fn read(&self) -> RwLockReadGuard<'_, Vec<RegistryEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<RegistryEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
