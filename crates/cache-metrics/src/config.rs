//! Instrumentation and exporter configuration.
//!
//! `InstrumentationConfig` is built in code. `ExporterConfig` is loaded from
//! environment variables with sensible defaults.

use crate::errors::ConfigError;
use crate::global;
use crate::sink::MeterProvider;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

/// Environment variable holding comma separated `key=value` global labels.
pub const GLOBAL_LABELS_ENV: &str = "CACHE_METRICS_GLOBAL_LABELS";

/// Environment variable holding an optional metric name prefix.
pub const PREFIX_ENV: &str = "CACHE_METRICS_PREFIX";

/// Options for one `instrument_cache` call.
///
/// The default resolves the process-wide meter provider at construction
/// time (see [`global::meter_provider`]).
#[derive(Debug, Clone)]
pub struct InstrumentationConfig {
    pub meter_provider: Arc<dyn MeterProvider>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            meter_provider: global::meter_provider(),
        }
    }
}

impl InstrumentationConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `provider` instead of the process-wide default.
    #[must_use]
    pub fn with_meter_provider(mut self, provider: Arc<dyn MeterProvider>) -> Self {
        self.meter_provider = provider;
        self
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExporterConfig {
    /// Labels added to every rendered series, in declaration order.
    pub global_labels: Vec<(String, String)>,

    /// Prefix prepended to every metric name (e.g. `app` gives `app_cache_hit`).
    pub prefix: Option<String>,
}

impl ExporterConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let global_labels = match vars.get(GLOBAL_LABELS_ENV) {
            Some(raw) => parse_labels(raw)?,
            None => Vec::new(),
        };

        let prefix = match vars.get(PREFIX_ENV).map(|p| p.trim()) {
            None | Some("") => None,
            Some(prefix) => {
                if !is_valid_metric_token(prefix) {
                    return Err(ConfigError::InvalidPrefix(format!(
                        "{PREFIX_ENV} must contain only ASCII letters, digits and '_', got '{prefix}'"
                    )));
                }
                Some(prefix.to_string())
            }
        };

        Ok(Self {
            global_labels,
            prefix,
        })
    }
}

fn parse_labels(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut labels: Vec<(String, String)> = Vec::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            ConfigError::InvalidGlobalLabel(format!(
                "{GLOBAL_LABELS_ENV} entries must be key=value, got '{pair}'"
            ))
        })?;
        let key = key.trim();

        if !is_valid_metric_token(key) {
            return Err(ConfigError::InvalidGlobalLabel(format!(
                "label key must contain only ASCII letters, digits and '_', got '{key}'"
            )));
        }

        if key == "cache_name" {
            return Err(ConfigError::InvalidGlobalLabel(
                "label key 'cache_name' is reserved for per-cache attributes".to_string(),
            ));
        }

        if labels.iter().any(|(existing, _)| existing == key) {
            return Err(ConfigError::InvalidGlobalLabel(format!(
                "label key '{key}' is specified more than once"
            )));
        }

        labels.push((key.to_string(), value.trim().to_string()));
    }

    Ok(labels)
}

fn is_valid_metric_token(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
