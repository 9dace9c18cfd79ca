//! Meter provider backed by the `metrics` facade.
//!
//! Callbacks registered here run only when [`RecorderMeterProvider::collect`]
//! is called. Each observation is published to the recorder that is current
//! at that moment (the global recorder, or a local one installed with
//! `metrics::with_local_recorder`):
//!
//! ```text
//! cache.hit{cache_name="sessions"} = <absolute value>
//! ```
//!
//! Descriptions are re-sent on every collection so a recorder installed
//! after registration still receives them.

use crate::errors::SinkError;
use crate::sink::{
    CounterDescriptor, InstrumentationScope, Meter, MeterProvider, ObservableCounter,
    ObservationAttributes, ObservationCallback, Observer,
};
use metrics::{counter, describe_counter, SharedString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Provider that publishes observations through the `metrics` facade.
#[derive(Default)]
pub struct RecorderMeterProvider {
    shared: Arc<Shared>,
    meters: Mutex<HashMap<InstrumentationScope, Arc<RecorderMeter>>>,
}

// Owner tokens are unique across providers in the process.
static NEXT_OWNER: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Shared {
    prefix: Option<String>,
    registrations: Mutex<Vec<Arc<Registration>>>,
}

struct Registration {
    scope: InstrumentationScope,
    instruments: Vec<ObservableCounter>,
    callback: ObservationCallback,
}

impl RecorderMeterProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every published metric name with `prefix_`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                prefix: Some(prefix.into()),
                ..Shared::default()
            }),
            meters: Mutex::default(),
        }
    }

    /// Run every registered callback and publish the observations.
    ///
    /// Returns the number of observations published. Callbacks that retire
    /// during the run are dropped afterwards.
    pub fn collect(&self) -> usize {
        // Callbacks run without the registration lock held.
        let registrations = lock(&self.shared.registrations).clone();
        let mut published = 0;
        let mut retired = Vec::new();

        for registration in &registrations {
            for instrument in &registration.instruments {
                describe_counter!(
                    self.shared.metric_name(instrument.name()),
                    instrument.description()
                );
            }

            let mut observer = FacadeObserver {
                shared: &self.shared,
                allowed: &registration.instruments,
                published: 0,
                retired: false,
            };
            (registration.callback)(&mut observer);
            trace!(
                scope = registration.scope.name,
                observations = observer.published,
                "Collected cache metrics"
            );
            published += observer.published;
            if observer.retired {
                retired.push(Arc::clone(registration));
            }
        }

        if !retired.is_empty() {
            lock(&self.shared.registrations)
                .retain(|r| !retired.iter().any(|done| Arc::ptr_eq(r, done)));
            debug!(count = retired.len(), "Dropped retired cache metric callbacks");
        }

        published
    }

    /// Number of callbacks registered across all scopes.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        lock(&self.shared.registrations).len()
    }
}

impl MeterProvider for RecorderMeterProvider {
    fn meter(&self, scope: InstrumentationScope) -> Option<Arc<dyn Meter>> {
        let mut meters = lock(&self.meters);
        let meter = meters.entry(scope).or_insert_with(|| {
            Arc::new(RecorderMeter {
                scope,
                owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
                shared: Arc::clone(&self.shared),
                instruments: Mutex::default(),
            })
        });
        Some(Arc::clone(meter) as Arc<dyn Meter>)
    }
}

impl Shared {
    fn metric_name(&self, name: &'static str) -> SharedString {
        match &self.prefix {
            Some(prefix) => SharedString::from(format!("{prefix}_{name}")),
            None => SharedString::const_str(name),
        }
    }
}

struct RecorderMeter {
    scope: InstrumentationScope,
    owner: usize,
    shared: Arc<Shared>,
    instruments: Mutex<HashMap<&'static str, ObservableCounter>>,
}

impl Meter for RecorderMeter {
    fn observable_counter(
        &self,
        descriptor: CounterDescriptor,
    ) -> Result<ObservableCounter, SinkError> {
        let mut instruments = lock(&self.instruments);

        if let Some(existing) = instruments.get(descriptor.name) {
            if existing.descriptor() == descriptor {
                return Ok(*existing);
            }
            return Err(SinkError::ConflictingInstrument(descriptor.name.to_string()));
        }

        let instrument = ObservableCounter::new(descriptor, self.owner);
        instruments.insert(descriptor.name, instrument);
        debug!(
            scope = self.scope.name,
            instrument = descriptor.name,
            "Created observable counter"
        );
        Ok(instrument)
    }

    fn register_callback(
        &self,
        instruments: &[ObservableCounter],
        callback: ObservationCallback,
    ) -> Result<(), SinkError> {
        {
            let known = lock(&self.instruments);
            for instrument in instruments {
                let ours = instrument.owner() == self.owner
                    && known.get(instrument.name()) == Some(instrument);
                if !ours {
                    return Err(SinkError::UnknownInstrument(instrument.name().to_string()));
                }
            }
        }

        lock(&self.shared.registrations).push(Arc::new(Registration {
            scope: self.scope,
            instruments: instruments.to_vec(),
            callback,
        }));
        Ok(())
    }
}

struct FacadeObserver<'a> {
    shared: &'a Shared,
    allowed: &'a [ObservableCounter],
    published: usize,
    retired: bool,
}

impl Observer for FacadeObserver<'_> {
    fn observe(
        &mut self,
        instrument: &ObservableCounter,
        value: u64,
        attributes: &ObservationAttributes<'_>,
    ) {
        if !self.allowed.contains(instrument) {
            debug!(
                instrument = instrument.name(),
                "Dropping observation for instrument not bound to this callback"
            );
            return;
        }

        counter!(
            self.shared.metric_name(instrument.name()),
            ObservationAttributes::CACHE_NAME_KEY => attributes.cache_name.to_string()
        )
        .absolute(value);
        self.published += 1;
    }

    fn retire(&mut self) {
        self.retired = true;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    const SCOPE: InstrumentationScope = InstrumentationScope {
        name: "recorder-test",
        version: "0.0.0",
    };

    const HITS: CounterDescriptor = CounterDescriptor {
        name: "cache.hit",
        description: "Number of cache hits",
    };

    #[test]
    fn test_same_scope_returns_same_meter_instruments() {
        let provider = RecorderMeterProvider::new();
        let first = provider.meter(SCOPE).unwrap().observable_counter(HITS).unwrap();
        let second = provider.meter(SCOPE).unwrap().observable_counter(HITS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_conflicting_description_rejected() {
        let provider = RecorderMeterProvider::new();
        let meter = provider.meter(SCOPE).unwrap();
        meter.observable_counter(HITS).unwrap();

        let err = meter
            .observable_counter(CounterDescriptor {
                name: "cache.hit",
                description: "something else",
            })
            .unwrap_err();
        assert_eq!(err, SinkError::ConflictingInstrument("cache.hit".to_string()));
    }

    #[test]
    fn test_foreign_instrument_rejected() {
        let provider = RecorderMeterProvider::new();
        let meter = provider.meter(SCOPE).unwrap();
        meter.observable_counter(HITS).unwrap();

        let other_provider = RecorderMeterProvider::new();
        let from_other_provider = other_provider
            .meter(SCOPE)
            .unwrap()
            .observable_counter(HITS)
            .unwrap();
        let from_other_scope = provider
            .meter(InstrumentationScope {
                name: "other",
                version: "0.0.0",
            })
            .unwrap()
            .observable_counter(HITS)
            .unwrap();

        for foreign in [from_other_provider, from_other_scope] {
            let err = meter
                .register_callback(&[foreign], Box::new(|_: &mut dyn Observer| {}))
                .unwrap_err();
            assert_eq!(err, SinkError::UnknownInstrument("cache.hit".to_string()));
        }
        assert_eq!(provider.callback_count(), 0);
    }

    #[test]
    fn test_collect_publishes_absolute_values_with_cache_name() {
        let provider = RecorderMeterProvider::new();
        let meter = provider.meter(SCOPE).unwrap();
        let hits = meter.observable_counter(HITS).unwrap();
        meter
            .register_callback(
                &[hits],
                Box::new(move |observer: &mut dyn Observer| {
                    observer.observe(&hits, 5, &ObservationAttributes { cache_name: "a" });
                    observer.observe(&hits, 9, &ObservationAttributes { cache_name: "b" });
                }),
            )
            .unwrap();

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let published = metrics::with_local_recorder(&recorder, || provider.collect());
        assert_eq!(published, 2);

        let mut values: Vec<(String, u64)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, description, value)| {
                assert_eq!(description.as_deref(), Some("Number of cache hits"));
                let cache_name = key
                    .key()
                    .labels()
                    .find(|label| label.key() == "cache_name")
                    .map(|label| label.value().to_string())?;
                match value {
                    DebugValue::Counter(v) => Some((cache_name, v)),
                    _ => None,
                }
            })
            .collect();
        values.sort();
        assert_eq!(values, vec![("a".to_string(), 5), ("b".to_string(), 9)]);
    }

    #[test]
    fn test_prefix_applied_to_metric_names() {
        let provider = RecorderMeterProvider::with_prefix("app");
        let meter = provider.meter(SCOPE).unwrap();
        let hits = meter.observable_counter(HITS).unwrap();
        meter
            .register_callback(
                &[hits],
                Box::new(move |observer: &mut dyn Observer| {
                    observer.observe(&hits, 1, &ObservationAttributes { cache_name: "a" });
                }),
            )
            .unwrap();

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, || provider.collect());

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();
        assert_eq!(names, vec!["app_cache.hit".to_string()]);
    }

    #[test]
    fn test_retired_callback_dropped_after_collect() {
        let provider = RecorderMeterProvider::new();
        let meter = provider.meter(SCOPE).unwrap();
        let hits = meter.observable_counter(HITS).unwrap();
        meter
            .register_callback(
                &[hits],
                Box::new(|observer: &mut dyn Observer| observer.retire()),
            )
            .unwrap();
        meter
            .register_callback(
                &[hits],
                Box::new(move |observer: &mut dyn Observer| {
                    observer.observe(&hits, 1, &ObservationAttributes { cache_name: "a" });
                }),
            )
            .unwrap();
        assert_eq!(provider.callback_count(), 2);

        let recorder = DebuggingRecorder::new();
        let published = metrics::with_local_recorder(&recorder, || provider.collect());
        assert_eq!(published, 1);
        assert_eq!(provider.callback_count(), 1);
    }

    #[test]
    fn test_observation_for_unbound_instrument_dropped() {
        let provider = RecorderMeterProvider::new();
        let meter = provider.meter(SCOPE).unwrap();
        let hits = meter.observable_counter(HITS).unwrap();
        let misses = meter
            .observable_counter(CounterDescriptor {
                name: "cache.miss",
                description: "Number of cache misses",
            })
            .unwrap();
        meter
            .register_callback(
                &[hits],
                Box::new(move |observer: &mut dyn Observer| {
                    observer.observe(&misses, 3, &ObservationAttributes { cache_name: "a" });
                }),
            )
            .unwrap();

        let recorder = DebuggingRecorder::new();
        let published = metrics::with_local_recorder(&recorder, || provider.collect());
        assert_eq!(published, 0);
    }
}
