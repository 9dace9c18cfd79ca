//! # Cache Metrics Test Utilities
//!
//! Shared fixtures for cache-metrics tests.
//!
//! This crate provides:
//! - `TestCache` - small bounded cache that maintains the six counters
//! - `MockMeterProvider` - in-memory sink with manual collection and failure modes
//! - `CounterSnapshot` - assertions over `metrics` facade output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cache_metrics::{InstrumentationConfig, InstrumentationContext};
//! use cache_metrics_test_utils::*;
//!
//! let provider = MockMeterProvider::new();
//! let config = InstrumentationConfig::new().with_meter_provider(provider.as_provider());
//! let context = InstrumentationContext::new();
//! let cache = TestCache::shared(16);
//!
//! context.instrument_cache(&cache, "users", &config)?;
//! cache.insert("k", "v");
//!
//! let scopes = provider.collect();
//! assert_eq!(scopes[0].metric("cache.insert").unwrap().value_for("users"), Some(1));
//! ```

pub mod assertions;
pub mod mock_provider;
pub mod test_cache;

// Re-export commonly used items
pub use assertions::*;
pub use mock_provider::*;
pub use test_cache::*;

/// Install a test-friendly tracing subscriber once per process.
///
/// Respects `RUST_LOG`; output goes through the test harness capture.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_metrics=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
