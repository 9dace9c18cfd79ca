//! Cache Metrics
//!
//! Exposes the runtime counters of named in-memory caches through a pull-based
//! metrics sink. Each observation is tagged with the logical cache name.
//!
//! # Architecture
//!
//! ```text
//! instrumentation.rs -> registry.rs -> counters.rs
//!         |
//!         +-> sink.rs (MeterProvider / Meter / Observer)
//!                |
//!                +-> recorder.rs (metrics facade) -> prometheus.rs
//! ```
//!
//! # Modules
//!
//! - `counters` - The six-counter snapshot and the capability trait caches implement
//! - `registry` - Thread-safe table of named cache handles
//! - `instrumentation` - `InstrumentationContext` and the one-shot registration logic
//! - `sink` - Capability traits for metrics sinks plus the no-op sink
//! - `recorder` - Sink that publishes observations through the `metrics` facade
//! - `prometheus` - Prometheus text rendering on top of the recorder sink
//! - `global` - Process-wide default meter provider
//! - `config` - Instrumentation and exporter configuration
//! - `errors` - Error types

#![warn(clippy::pedantic)]

pub mod config;
pub mod counters;
pub mod errors;
pub mod global;
pub mod instrumentation;
pub mod prometheus;
pub mod recorder;
pub mod registry;
pub mod sink;

pub use config::{ExporterConfig, InstrumentationConfig};
pub use counters::{AtomicCacheCounters, CacheCounters, CacheMetricsSource};
pub use errors::{ConfigError, InstrumentationError, SinkError};
pub use instrumentation::{
    instrument_cache, InstrumentationContext, RegistrationState, CACHE_METRICS, SCOPE,
};
pub use prometheus::PrometheusCacheExporter;
pub use recorder::RecorderMeterProvider;
pub use registry::CacheRegistry;
pub use sink::{
    CounterDescriptor, InstrumentationScope, Meter, MeterProvider, NoopMeterProvider,
    ObservableCounter, ObservationAttributes, ObservationCallback, Observer,
};
