//! Metrics sink capability traits.
//!
//! A sink hands out named, versioned [`Meter`]s. A meter creates observable
//! counters and accepts one callback covering several of them. The sink
//! decides when to invoke the callback (pull model); instrumentation code
//! never pushes values on its own.

use crate::errors::SinkError;
use std::fmt;
use std::sync::Arc;

/// Name and version identifying the library that owns a set of instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrumentationScope {
    pub name: &'static str,
    pub version: &'static str,
}

/// Static definition of one observable counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

/// Handle to an observable counter created by a [`Meter`].
///
/// `owner` is an opaque token chosen by the sink so it can tell its own
/// instruments apart from another meter's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservableCounter {
    descriptor: CounterDescriptor,
    owner: usize,
}

impl ObservableCounter {
    #[must_use]
    pub fn new(descriptor: CounterDescriptor, owner: usize) -> Self {
        Self { descriptor, owner }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        self.descriptor.description
    }

    #[must_use]
    pub fn descriptor(&self) -> CounterDescriptor {
        self.descriptor
    }

    #[must_use]
    pub fn owner(&self) -> usize {
        self.owner
    }
}

/// Attributes attached to every observation of one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationAttributes<'a> {
    pub cache_name: &'a str,
}

impl ObservationAttributes<'_> {
    /// Attribute key carrying the cache name.
    pub const CACHE_NAME_KEY: &'static str = "cache_name";
}

/// Receives values while a callback runs.
pub trait Observer {
    fn observe(
        &mut self,
        counter: &ObservableCounter,
        value: u64,
        attributes: &ObservationAttributes<'_>,
    );

    /// Mark the running callback as permanently done. A sink may drop it
    /// once the current collection finishes.
    fn retire(&mut self) {}
}

/// Callback invoked by the sink on its own schedule.
pub type ObservationCallback = Box<dyn Fn(&mut dyn Observer) + Send + Sync>;

/// A scope-bound factory for instruments.
pub trait Meter: Send + Sync {
    /// Create (or look up) an observable counter.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the sink refuses the instrument.
    fn observable_counter(
        &self,
        descriptor: CounterDescriptor,
    ) -> Result<ObservableCounter, SinkError>;

    /// Register one callback that observes all `instruments`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if an instrument does not belong to this meter or
    /// the sink refuses the callback.
    fn register_callback(
        &self,
        instruments: &[ObservableCounter],
        callback: ObservationCallback,
    ) -> Result<(), SinkError>;
}

/// Source of meters.
pub trait MeterProvider: Send + Sync {
    /// Meter for `scope`, or `None` when the sink does not collect metrics.
    fn meter(&self, scope: InstrumentationScope) -> Option<Arc<dyn Meter>>;
}

/// Provider that declines every scope, leaving metrics disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMeterProvider;

impl MeterProvider for NoopMeterProvider {
    fn meter(&self, _scope: InstrumentationScope) -> Option<Arc<dyn Meter>> {
        None
    }
}

impl fmt::Debug for dyn MeterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MeterProvider")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_provider_declines_every_scope() {
        let provider = NoopMeterProvider;
        let scope = InstrumentationScope {
            name: "test",
            version: "0.0.0",
        };
        assert!(provider.meter(scope).is_none());
    }

    #[test]
    fn test_observable_counter_exposes_descriptor() {
        let descriptor = CounterDescriptor {
            name: "cache.hit",
            description: "Number of cache hits",
        };
        let counter = ObservableCounter::new(descriptor, 7);
        assert_eq!(counter.name(), "cache.hit");
        assert_eq!(counter.description(), "Number of cache hits");
        assert_eq!(counter.descriptor(), descriptor);
        assert_eq!(counter.owner(), 7);
    }
}
