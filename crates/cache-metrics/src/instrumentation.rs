//! Cache instrumentation entry point.
//!
//! [`InstrumentationContext::instrument_cache`] records a named cache in the
//! context's registry. The first successful call of an epoch also registers
//! the six cache counters and one callback with the metrics sink; later
//! calls only add registry entries, which the existing callback picks up on
//! the next collection.
//!
//! # Registration state
//!
//! ```text
//! Unregistered --first add--> Registered | Disabled | Failed
//!      ^                                |
//!      +------------- reset ------------+
//! ```
//!
//! The state mutex is held for the whole sink registration, so a concurrent
//! caller blocks until the instruments exist instead of racing past a
//! half-registered epoch.

use crate::config::InstrumentationConfig;
use crate::counters::{CacheCounters, CacheMetricsSource};
use crate::errors::{InstrumentationError, SinkError};
use crate::registry::CacheRegistry;
use crate::sink::{
    CounterDescriptor, InstrumentationScope, Meter, ObservableCounter, ObservationAttributes,
    Observer,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tracing::{debug, info, warn};

/// Scope under which the cache counters are registered.
pub const SCOPE: InstrumentationScope = InstrumentationScope {
    name: "cache-metrics",
    version: env!("CARGO_PKG_VERSION"),
};

/// The six cache counters. Callbacks report values in this order.
pub const CACHE_METRICS: [CounterDescriptor; 6] = [
    CounterDescriptor {
        name: "cache.hit",
        description: "Number of cache hits",
    },
    CounterDescriptor {
        name: "cache.miss",
        description: "Number of cache misses",
    },
    CounterDescriptor {
        name: "cache.insert",
        description: "Number of cache inserts",
    },
    CounterDescriptor {
        name: "cache.eviction",
        description: "Number of cache evictions",
    },
    CounterDescriptor {
        name: "cache.collision",
        description: "Number of cache collisions",
    },
    CounterDescriptor {
        name: "cache.removal",
        description: "Number of cache removals",
    },
];

fn counter_values(counters: &CacheCounters) -> [u64; 6] {
    [
        counters.hits,
        counters.misses,
        counters.inserts,
        counters.evictions,
        counters.collisions,
        counters.removals,
    ]
}

/// Where the current epoch stands with respect to sink registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No successful `instrument_cache` call yet.
    Unregistered,
    /// Instruments and callback are registered with the sink.
    Registered,
    /// The sink declined to provide a meter; nothing is collected.
    Disabled,
    /// The sink rejected registration. Not retried until reset.
    Failed,
}

/// Registry of instrumented caches plus the one-shot registration state.
pub struct InstrumentationContext {
    registry: Arc<CacheRegistry>,
    state: Mutex<RegistrationState>,
    epoch: Arc<AtomicU64>,
}

impl Default for InstrumentationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CacheRegistry::new()),
            state: Mutex::new(RegistrationState::Unregistered),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Process-wide context used by the free [`instrument_cache`] function.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL_CONTEXT: OnceLock<InstrumentationContext> = OnceLock::new();
        GLOBAL_CONTEXT.get_or_init(Self::new)
    }

    /// Register `cache` under `name` and, on the first call of the epoch,
    /// register the cache counters with the configured meter provider.
    ///
    /// The registry keeps only a weak handle; the cache stops being reported
    /// once the caller drops its last `Arc`.
    ///
    /// # Errors
    ///
    /// - [`InstrumentationError::DuplicateName`] if `name` is already taken.
    ///   Nothing else happens in that case.
    /// - [`InstrumentationError::Sink`] if the sink rejects the instruments.
    ///   The cache stays registered; only the first call of an epoch can see
    ///   this error.
    pub fn instrument_cache<C>(
        &self,
        cache: &Arc<C>,
        name: &str,
        config: &InstrumentationConfig,
    ) -> Result<(), InstrumentationError>
    where
        C: CacheMetricsSource + 'static,
    {
        let handle: Weak<C> = Arc::downgrade(cache);
        let handle: Weak<dyn CacheMetricsSource> = handle;
        self.registry.add(handle, name)?;

        let mut state = self.lock_state();
        if *state != RegistrationState::Unregistered {
            return Ok(());
        }

        let Some(meter) = config.meter_provider.meter(SCOPE) else {
            debug!(
                scope = SCOPE.name,
                "Meter provider declined scope, cache metrics disabled"
            );
            *state = RegistrationState::Disabled;
            return Ok(());
        };

        let epoch = self.epoch.load(Ordering::Acquire);
        match register_instruments(meter.as_ref(), self.registry_handle(), epoch) {
            Ok(()) => {
                info!(
                    scope = SCOPE.name,
                    version = SCOPE.version,
                    cache_name = %name,
                    "Registered cache metrics"
                );
                *state = RegistrationState::Registered;
                Ok(())
            }
            Err(e) => {
                warn!(
                    scope = SCOPE.name,
                    error = %e,
                    "Metrics sink rejected cache instruments"
                );
                *state = RegistrationState::Failed;
                Err(e.into())
            }
        }
    }

    /// Stop reporting the cache registered under `name`.
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self.registry.remove(name);
        if removed {
            debug!(cache_name = %name, "Cache deregistered");
        }
        removed
    }

    /// Clear the registry and start a new epoch.
    ///
    /// Callbacks registered in earlier epochs report nothing from now on and
    /// retire at their next run; the next `instrument_cache` call registers
    /// a fresh set.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.registry.reset();
        *state = RegistrationState::Unregistered;
    }

    #[must_use]
    pub fn registration_state(&self) -> RegistrationState {
        *self.lock_state()
    }

    #[must_use]
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    fn registry_handle(&self) -> EpochRegistry {
        EpochRegistry {
            registry: Arc::clone(&self.registry),
            current_epoch: Arc::clone(&self.epoch),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistrationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry view captured by a sink callback, bound to the epoch it was
/// registered in.
struct EpochRegistry {
    registry: Arc<CacheRegistry>,
    current_epoch: Arc<AtomicU64>,
}

fn register_instruments(
    meter: &dyn Meter,
    view: EpochRegistry,
    epoch: u64,
) -> Result<(), SinkError> {
    let instruments = CACHE_METRICS
        .iter()
        .map(|descriptor| meter.observable_counter(*descriptor))
        .collect::<Result<Vec<ObservableCounter>, SinkError>>()?;

    let observed = instruments.clone();
    meter.register_callback(
        &instruments,
        Box::new(move |observer: &mut dyn Observer| {
            if view.current_epoch.load(Ordering::Acquire) != epoch {
                observer.retire();
                return;
            }

            view.registry.for_each(|name, cache| {
                let values = counter_values(&cache.counters());
                let attributes = ObservationAttributes { cache_name: name };
                for (instrument, value) in observed.iter().zip(values) {
                    observer.observe(instrument, value, &attributes);
                }
            });
        }),
    )
}

/// Instrument `cache` in the process-wide context.
///
/// # Errors
///
/// See [`InstrumentationContext::instrument_cache`].
pub fn instrument_cache<C>(
    cache: &Arc<C>,
    name: &str,
    config: &InstrumentationConfig,
) -> Result<(), InstrumentationError>
where
    C: CacheMetricsSource + 'static,
{
    InstrumentationContext::global().instrument_cache(cache, name, config)
}
