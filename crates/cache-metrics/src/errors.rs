//! Error types for cache instrumentation.

use thiserror::Error;

/// Errors surfaced by a metrics sink while creating instruments or
/// registering callbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// An instrument with this name already exists with a different description.
    #[error("instrument '{0}' already registered with a different description")]
    ConflictingInstrument(String),

    /// A callback referenced an instrument this meter never created.
    #[error("instrument '{0}' was not created by this meter")]
    UnknownInstrument(String),

    /// The sink refused the registration for its own reasons.
    #[error("metrics sink rejected registration: {0}")]
    Rejected(String),
}

/// Errors returned from `instrument_cache`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentationError {
    /// A cache is already registered under this name.
    #[error("cache with name '{0}' already exists")]
    DuplicateName(String),

    /// The metrics sink failed while registering the cache instruments.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Invalid exporter configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid global label configuration: {0}")]
    InvalidGlobalLabel(String),

    #[error("Invalid metric prefix configuration: {0}")]
    InvalidPrefix(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_name_message_identifies_the_name() {
        let err = InstrumentationError::DuplicateName("sessions".to_string());
        assert_eq!(err.to_string(), "cache with name 'sessions' already exists");
    }

    #[test]
    fn test_sink_error_is_propagated_verbatim() {
        let sink = SinkError::Rejected("quota exceeded".to_string());
        let err = InstrumentationError::from(sink.clone());
        assert_eq!(err.to_string(), sink.to_string());
        assert_eq!(err, InstrumentationError::Sink(sink));
    }
}
