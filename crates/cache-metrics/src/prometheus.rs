//! Prometheus text rendering for cache metrics.
//!
//! Every [`PrometheusCacheExporter::render`] call builds a private Prometheus
//! recorder, samples the registered caches into it and renders the result.
//! A scrape therefore holds exactly the caches that are registered at that
//! moment; deregistered, dropped or reset caches vanish from the next one:
//!
//! ```text
//! # TYPE cache_hit counter
//! cache_hit{cache_name="sessions"} 42
//! ```
//!
//! No global recorder is installed, so the exporter can live next to
//! whatever recorder the application already uses. Serving the text over
//! HTTP is left to the application.

use crate::config::ExporterConfig;
use crate::recorder::RecorderMeterProvider;
use crate::sink::MeterProvider;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::trace;

/// Prometheus exporter bound to its own [`RecorderMeterProvider`].
pub struct PrometheusCacheExporter {
    provider: Arc<RecorderMeterProvider>,
    global_labels: Vec<(String, String)>,
}

impl Default for PrometheusCacheExporter {
    fn default() -> Self {
        Self::from_config(&ExporterConfig::default())
    }
}

impl PrometheusCacheExporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an exporter with the configured global labels and prefix.
    #[must_use]
    pub fn from_config(config: &ExporterConfig) -> Self {
        let provider = match &config.prefix {
            Some(prefix) => RecorderMeterProvider::with_prefix(prefix.clone()),
            None => RecorderMeterProvider::new(),
        };

        Self {
            provider: Arc::new(provider),
            global_labels: config.global_labels.clone(),
        }
    }

    /// Provider to pass to `InstrumentationConfig::with_meter_provider`.
    #[must_use]
    pub fn meter_provider(&self) -> Arc<dyn MeterProvider> {
        self.provider.clone()
    }

    /// Sample every registered cache and render the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        let recorder = self
            .global_labels
            .iter()
            .fold(PrometheusBuilder::new(), |builder, (key, value)| {
                builder.add_global_label(key, value)
            })
            .build_recorder();
        let handle = recorder.handle();

        let observations = metrics::with_local_recorder(&recorder, || self.provider.collect());
        trace!(observations, "Rendering cache metrics");
        handle.render()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::InstrumentationConfig;
    use crate::counters::AtomicCacheCounters;
    use crate::instrumentation::InstrumentationContext;

    #[test]
    fn test_render_without_caches_is_empty() {
        let exporter = PrometheusCacheExporter::new();
        assert!(!exporter.render().contains("cache_hit"));
    }

    #[test]
    fn test_render_samples_live_counters() {
        let exporter = PrometheusCacheExporter::new();
        let config = InstrumentationConfig::new().with_meter_provider(exporter.meter_provider());
        let context = InstrumentationContext::new();
        let cache = Arc::new(AtomicCacheCounters::new());
        context.instrument_cache(&cache, "users", &config).unwrap();

        cache.record_hit();
        let first = exporter.render();
        assert!(first.contains("# TYPE cache_hit counter"), "{first}");
        assert!(first.contains("cache_hit{cache_name=\"users\"} 1"), "{first}");

        cache.record_hit();
        cache.record_hit();
        let second = exporter.render();
        assert!(second.contains("cache_hit{cache_name=\"users\"} 3"), "{second}");
        assert!(second.contains("cache_removal{cache_name=\"users\"} 0"), "{second}");
    }

    #[test]
    fn test_global_labels_and_prefix_applied() {
        let exporter = PrometheusCacheExporter::from_config(&ExporterConfig {
            global_labels: vec![("service".to_string(), "api".to_string())],
            prefix: Some("app".to_string()),
        });
        let config = InstrumentationConfig::new().with_meter_provider(exporter.meter_provider());
        let context = InstrumentationContext::new();
        let cache = Arc::new(AtomicCacheCounters::new());
        context.instrument_cache(&cache, "users", &config).unwrap();

        let output = exporter.render();
        let line = output
            .lines()
            .find(|line| line.starts_with("app_cache_miss{"))
            .unwrap();
        assert!(line.contains("cache_name=\"users\""), "{line}");
        assert!(line.contains("service=\"api\""), "{line}");
    }

    #[test]
    fn test_removed_caches_leave_the_scrape() {
        let exporter = PrometheusCacheExporter::new();
        let config = InstrumentationConfig::new().with_meter_provider(exporter.meter_provider());
        let context = InstrumentationContext::new();
        let a = Arc::new(AtomicCacheCounters::new());
        let b = Arc::new(AtomicCacheCounters::new());
        context.instrument_cache(&a, "a", &config).unwrap();
        context.instrument_cache(&b, "b", &config).unwrap();

        let both = exporter.render();
        assert!(both.contains("cache_hit{cache_name=\"a\"} 0"), "{both}");
        assert!(both.contains("cache_hit{cache_name=\"b\"} 0"), "{both}");

        assert!(context.deregister("b"));
        let after_deregister = exporter.render();
        assert!(after_deregister.contains("cache_name=\"a\""), "{after_deregister}");
        assert!(!after_deregister.contains("cache_name=\"b\""), "{after_deregister}");

        drop(a);
        let after_drop = exporter.render();
        assert!(!after_drop.contains("cache_name="), "{after_drop}");

        let c = Arc::new(AtomicCacheCounters::new());
        context.instrument_cache(&c, "c", &config).unwrap();
        context.reset();
        let after_reset = exporter.render();
        assert!(!after_reset.contains("cache_name="), "{after_reset}");
    }
}
