//! Error types

use std::path::PathBuf;

use thiserror::Error;

/// Configuration failures.
///
/// These are the only fatal errors: they are raised while a kit configuration
/// is loaded, before any stick loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration is not valid JSON")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported configuration version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Zone name '{0}' is defined more than once")]
    DuplicateZone(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reading a sample from a sensor.
///
/// Always recoverable: the tick is skipped and the stick keeps its previous
/// orientation and detector state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("Bus transaction failed: {0}")]
    Bus(String),

    #[error("Sensor read timed out after {0:?}")]
    Timeout(core::time::Duration),

    #[error("Malformed sensor frame: expected {expected} bytes, got {actual}")]
    Frame { expected: usize, actual: usize },

    #[error("Sensor is disconnected")]
    Disconnected,
}
