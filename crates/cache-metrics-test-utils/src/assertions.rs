//! Assertions over counters published through the `metrics` facade.
//!
//! Wraps a thread-local `DebuggingRecorder` so tests can run a collection
//! and inspect the counters it produced without installing a global
//! recorder.
//!
//! # Example
//!
//! ```rust,ignore
//! let (_, snapshot) = capture_counters(|| provider.collect());
//! snapshot
//!     .assert_counter("cache.insert", "users", 2)
//!     .assert_counter("cache.hit", "users", 1);
//! ```

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use std::collections::BTreeMap;

/// Counter values keyed by `(metric name, cache_name label)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    values: BTreeMap<(String, String), u64>,
    descriptions: BTreeMap<String, String>,
}

impl CounterSnapshot {
    /// Read every counter carrying a `cache_name` label from `snapshotter`.
    #[must_use]
    pub fn from_snapshotter(snapshotter: &Snapshotter) -> Self {
        let mut snapshot = Self::default();
        for (key, _unit, description, value) in snapshotter.snapshot().into_vec() {
            let DebugValue::Counter(value) = value else {
                continue;
            };
            let name = key.key().name().to_string();
            let Some(cache_name) = key
                .key()
                .labels()
                .find(|label| label.key() == "cache_name")
                .map(|label| label.value().to_string())
            else {
                continue;
            };
            if let Some(description) = description {
                snapshot
                    .descriptions
                    .insert(name.clone(), description.to_string());
            }
            snapshot.values.insert((name, cache_name), value);
        }
        snapshot
    }

    /// Value of `metric` for `cache_name`.
    #[must_use]
    pub fn value(&self, metric: &str, cache_name: &str) -> Option<u64> {
        self.values
            .get(&(metric.to_string(), cache_name.to_string()))
            .copied()
    }

    /// Sorted cache names reported for `metric`.
    #[must_use]
    pub fn cache_names(&self, metric: &str) -> Vec<String> {
        self.values
            .keys()
            .filter(|(name, _)| name == metric)
            .map(|(_, cache_name)| cache_name.clone())
            .collect()
    }

    /// Description recorded for `metric`.
    #[must_use]
    pub fn description(&self, metric: &str) -> Option<&str> {
        self.descriptions.get(metric).map(String::as_str)
    }

    /// Assert `metric{cache_name}` equals `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the counter is missing or has a different value.
    pub fn assert_counter(&self, metric: &str, cache_name: &str, expected: u64) -> &Self {
        assert_eq!(
            self.value(metric, cache_name),
            Some(expected),
            "Expected {metric}{{cache_name=\"{cache_name}\"}} = {expected}, snapshot: {:?}",
            self.values
        );
        self
    }

    /// Assert that all six counters of `cache_name` match
    /// `[hit, miss, insert, eviction, collision, removal]`.
    ///
    /// # Panics
    ///
    /// Panics on the first mismatch.
    pub fn assert_cache(&self, cache_name: &str, expected: [u64; 6]) -> &Self {
        let metrics = [
            "cache.hit",
            "cache.miss",
            "cache.insert",
            "cache.eviction",
            "cache.collision",
            "cache.removal",
        ];
        for (metric, value) in metrics.into_iter().zip(expected) {
            self.assert_counter(metric, cache_name, value);
        }
        self
    }
}

/// Run `f` with a fresh thread-local `DebuggingRecorder` and return its
/// result together with the counters it published.
pub fn capture_counters<T>(f: impl FnOnce() -> T) -> (T, CounterSnapshot) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let result = metrics::with_local_recorder(&recorder, f);
    (result, CounterSnapshot::from_snapshotter(&snapshotter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_reads_labelled_counters_only() {
        let (_, snapshot) = capture_counters(|| {
            metrics::describe_counter!("cache.hit", "Number of cache hits");
            metrics::counter!("cache.hit", "cache_name" => "a").absolute(3);
            metrics::counter!("unlabelled").increment(1);
        });

        snapshot.assert_counter("cache.hit", "a", 3);
        assert_eq!(snapshot.cache_names("cache.hit"), vec!["a".to_string()]);
        assert_eq!(snapshot.description("cache.hit"), Some("Number of cache hits"));
        assert!(snapshot.cache_names("unlabelled").is_empty());
    }

    #[test]
    #[should_panic(expected = "Expected cache.miss")]
    fn test_assert_counter_panics_on_missing_counter() {
        let (_, snapshot) = capture_counters(|| {});
        snapshot.assert_counter("cache.miss", "a", 0);
    }
}
