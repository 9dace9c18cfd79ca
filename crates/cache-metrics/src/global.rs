//! Process-wide default meter provider.
//!
//! Until [`set_meter_provider`] is called the default is
//! [`NoopMeterProvider`], so instrumentation succeeds but nothing is
//! collected.

use crate::sink::{MeterProvider, NoopMeterProvider};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

fn slot() -> &'static RwLock<Arc<dyn MeterProvider>> {
    static GLOBAL_METER_PROVIDER: OnceLock<RwLock<Arc<dyn MeterProvider>>> = OnceLock::new();
    GLOBAL_METER_PROVIDER.get_or_init(|| RwLock::new(Arc::new(NoopMeterProvider)))
}

/// Replace the process-wide default provider.
///
/// Only affects `InstrumentationConfig`s created afterwards.
pub fn set_meter_provider(provider: Arc<dyn MeterProvider>) {
    *slot().write().unwrap_or_else(PoisonError::into_inner) = provider;
}

/// The current process-wide default provider.
#[must_use]
pub fn meter_provider() -> Arc<dyn MeterProvider> {
    Arc::clone(&slot().read().unwrap_or_else(PoisonError::into_inner))
}
