//! In-memory meter provider for instrumentation tests.
//!
//! Records every meter, instrument and callback it hands out, and collects
//! on demand the way a manual reader does: [`MockMeterProvider::collect`]
//! runs all callbacks and groups the data points by scope and metric.
//!
//! # Example
//!
//! ```rust,ignore
//! let provider = MockMeterProvider::new().with_mode(MockMode::Decline);
//! // instrument_cache succeeds, but no instruments are created
//! assert_eq!(provider.instrument_count(), 0);
//! ```

use cache_metrics::{
    CounterDescriptor, InstrumentationScope, Meter, MeterProvider, ObservableCounter,
    ObservationAttributes, ObservationCallback, Observer, SinkError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How the mock responds to registration requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Hand out meters and accept everything.
    #[default]
    Accept,
    /// Return no meter for any scope.
    Decline,
    /// Fail `observable_counter` for the named instrument.
    RejectInstrument(&'static str),
    /// Fail `register_callback`.
    RejectCallback,
}

/// One observed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPoint {
    pub cache_name: String,
    pub value: u64,
}

/// All data points of one instrument in one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricData {
    pub name: &'static str,
    pub description: &'static str,
    pub data_points: Vec<DataPoint>,
}

impl MetricData {
    /// Value reported for `cache_name`, if exactly one point carries it.
    #[must_use]
    pub fn value_for(&self, cache_name: &str) -> Option<u64> {
        let mut matching = self
            .data_points
            .iter()
            .filter(|point| point.cache_name == cache_name);
        let first = matching.next()?;
        match matching.next() {
            Some(_) => None,
            None => Some(first.value),
        }
    }

    /// Cache names of all data points, in collection order.
    #[must_use]
    pub fn cache_names(&self) -> Vec<&str> {
        self.data_points
            .iter()
            .map(|point| point.cache_name.as_str())
            .collect()
    }
}

/// Collected metrics of one instrumentation scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeMetrics {
    pub scope: InstrumentationScope,
    pub metrics: Vec<MetricData>,
}

impl ScopeMetrics {
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&MetricData> {
        self.metrics.iter().find(|metric| metric.name == name)
    }
}

#[derive(Default)]
struct MockState {
    mode: MockMode,
    meter_requests: Vec<InstrumentationScope>,
    /// Instruments per scope, in creation order.
    instruments: Vec<(InstrumentationScope, ObservableCounter)>,
    callbacks: Vec<(InstrumentationScope, Arc<ObservationCallback>)>,
    next_owner: usize,
}

/// Mock metrics sink.
#[derive(Clone, Default)]
pub struct MockMeterProvider {
    inner: Arc<Mutex<MockState>>,
}

impl MockMeterProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registration behaviour.
    #[must_use]
    pub fn with_mode(self, mode: MockMode) -> Self {
        self.inner.lock().unwrap().mode = mode;
        self
    }

    /// This provider as a trait object for `InstrumentationConfig`.
    #[must_use]
    pub fn as_provider(&self) -> Arc<dyn MeterProvider> {
        Arc::new(self.clone())
    }

    /// Scopes passed to `meter`, in call order.
    #[must_use]
    pub fn meter_requests(&self) -> Vec<InstrumentationScope> {
        self.inner.lock().unwrap().meter_requests.clone()
    }

    /// Number of instruments created across all scopes.
    #[must_use]
    pub fn instrument_count(&self) -> usize {
        self.inner.lock().unwrap().instruments.len()
    }

    /// Number of callbacks registered across all scopes.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.inner.lock().unwrap().callbacks.len()
    }

    /// Run every callback and return the data grouped by scope.
    ///
    /// Scopes without instruments are omitted. Metrics appear in instrument
    /// creation order; a metric nobody observed has no data points.
    /// Callbacks that retire during the run are dropped afterwards.
    #[must_use]
    pub fn collect(&self) -> Vec<ScopeMetrics> {
        let (instruments, callbacks) = {
            let state = self.inner.lock().unwrap();
            (state.instruments.clone(), state.callbacks.clone())
        };

        let mut points: HashMap<ObservableCounter, Vec<DataPoint>> = HashMap::new();
        let mut retired = Vec::new();
        for (_, callback) in &callbacks {
            let mut observer = CollectingObserver {
                points: &mut points,
                retired: false,
            };
            (**callback)(&mut observer);
            if observer.retired {
                retired.push(Arc::clone(callback));
            }
        }
        if !retired.is_empty() {
            self.inner
                .lock()
                .unwrap()
                .callbacks
                .retain(|(_, c)| !retired.iter().any(|done| Arc::ptr_eq(c, done)));
        }

        let mut scopes: Vec<ScopeMetrics> = Vec::new();
        for (scope, instrument) in instruments {
            let metric = MetricData {
                name: instrument.name(),
                description: instrument.description(),
                data_points: points.remove(&instrument).unwrap_or_default(),
            };
            match scopes.iter_mut().find(|s| s.scope == scope) {
                Some(existing) => existing.metrics.push(metric),
                None => scopes.push(ScopeMetrics {
                    scope,
                    metrics: vec![metric],
                }),
            }
        }
        scopes
    }
}

impl MeterProvider for MockMeterProvider {
    fn meter(&self, scope: InstrumentationScope) -> Option<Arc<dyn Meter>> {
        let mut state = self.inner.lock().unwrap();
        state.meter_requests.push(scope);
        if state.mode == MockMode::Decline {
            return None;
        }
        let owner = state.next_owner;
        state.next_owner += 1;
        Some(Arc::new(MockMeter {
            scope,
            owner,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockMeter {
    scope: InstrumentationScope,
    owner: usize,
    inner: Arc<Mutex<MockState>>,
}

impl Meter for MockMeter {
    fn observable_counter(
        &self,
        descriptor: CounterDescriptor,
    ) -> Result<ObservableCounter, SinkError> {
        let mut state = self.inner.lock().unwrap();
        if state.mode == MockMode::RejectInstrument(descriptor.name) {
            return Err(SinkError::Rejected(format!(
                "mock refused instrument {}",
                descriptor.name
            )));
        }
        let instrument = ObservableCounter::new(descriptor, self.owner);
        state.instruments.push((self.scope, instrument));
        Ok(instrument)
    }

    fn register_callback(
        &self,
        instruments: &[ObservableCounter],
        callback: ObservationCallback,
    ) -> Result<(), SinkError> {
        let mut state = self.inner.lock().unwrap();
        if state.mode == MockMode::RejectCallback {
            return Err(SinkError::Rejected("mock refused callback".to_string()));
        }
        if let Some(foreign) = instruments.iter().find(|i| i.owner() != self.owner) {
            return Err(SinkError::UnknownInstrument(foreign.name().to_string()));
        }
        state.callbacks.push((self.scope, Arc::new(callback)));
        Ok(())
    }
}

struct CollectingObserver<'a> {
    points: &'a mut HashMap<ObservableCounter, Vec<DataPoint>>,
    retired: bool,
}

impl Observer for CollectingObserver<'_> {
    fn observe(
        &mut self,
        counter: &ObservableCounter,
        value: u64,
        attributes: &ObservationAttributes<'_>,
    ) {
        self.points.entry(*counter).or_default().push(DataPoint {
            cache_name: attributes.cache_name.to_string(),
            value,
        });
    }

    fn retire(&mut self) {
        self.retired = true;
    }
}
