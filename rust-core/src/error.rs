//! Error types for the unlock sensing engine.

use thiserror::Error;

/// Result type alias using [`MonitorError`].
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while configuring or driving the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A configuration value is out of range.
    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A configuration document could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// An event could not be encoded for the host bridge.
    #[error("event encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The orientation sensor is not available for this session.
    #[error("orientation sensor unavailable")]
    SensorUnavailable,

    /// A callback panicked while holding the monitor lock.
    #[error("monitor lock poisoned")]
    LockPoisoned,
}

impl MonitorError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        MonitorError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
