//! Process-wide instrumentation.
//!
//! Kept in its own test binary with a single test, since the global
//! context and provider are shared by every test in a process.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use cache_metrics::{
    global, instrument_cache, InstrumentationConfig, InstrumentationContext, InstrumentationError,
    RegistrationState,
};
use cache_metrics_test_utils::{init_test_tracing, MockMeterProvider, TestCache};

#[test]
fn test_global_context_uses_global_provider() {
    init_test_tracing();

    // Before a provider is installed the default sink discards everything.
    let early = TestCache::shared(4);
    instrument_cache(&early, "early", &InstrumentationConfig::default()).unwrap();
    assert_eq!(
        InstrumentationContext::global().registration_state(),
        RegistrationState::Disabled
    );

    let provider = MockMeterProvider::new();
    global::set_meter_provider(provider.as_provider());
    InstrumentationContext::global().reset();

    let sessions = TestCache::shared(4);
    instrument_cache(&sessions, "sessions", &InstrumentationConfig::default()).unwrap();
    assert_eq!(
        InstrumentationContext::global().registration_state(),
        RegistrationState::Registered
    );

    sessions.insert("user-1", "token");
    assert!(sessions.get("user-1").is_some());

    let err = instrument_cache(&sessions, "sessions", &InstrumentationConfig::default())
        .unwrap_err();
    assert!(matches!(err, InstrumentationError::DuplicateName(_)));

    let scopes = provider.collect();
    let hits = scopes[0].metric("cache.hit").unwrap();
    assert_eq!(hits.cache_names(), vec!["sessions"]);
    assert_eq!(hits.value_for("sessions"), Some(1));
    assert_eq!(scopes[0].metric("cache.insert").unwrap().value_for("sessions"), Some(1));
}
