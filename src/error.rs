//! Error types and handling for the charge tracker
//!
//! Most estimator faults are recovered internally (logged, then surfaced as
//! sentinel values); only configuration problems and host I/O are expected to
//! escape to callers.

use thiserror::Error;

/// Result type alias for charge tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Main error type for the charge tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Externally supplied value out of range (e.g. manual SoC)
    #[error("Invalid input: {field} = {value}")]
    InvalidInput { field: String, value: f64 },

    /// A duration cannot be estimated because the applicable charge rate is zero
    #[error("Missing charge rate: cannot estimate time to {target}")]
    MissingRate { target: String },

    /// External power reading unavailable or unparseable
    #[error("Power sensor unavailable: {message}")]
    SensorUnavailable { message: String },

    /// A persisted value failed to parse
    #[error("Malformed persisted state: {field} - {message}")]
    MalformedPersistedState { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl TrackerError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        TrackerError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        TrackerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(field: S, value: f64) -> Self {
        TrackerError::InvalidInput {
            field: field.into(),
            value,
        }
    }

    /// Create a new missing rate error
    pub fn missing_rate<S: Into<String>>(target: S) -> Self {
        TrackerError::MissingRate {
            target: target.into(),
        }
    }

    /// Create a new sensor unavailable error
    pub fn sensor_unavailable<S: Into<String>>(message: S) -> Self {
        TrackerError::SensorUnavailable {
            message: message.into(),
        }
    }

    /// Create a new malformed persisted state error
    pub fn malformed_state<S: Into<String>>(field: S, message: S) -> Self {
        TrackerError::MalformedPersistedState {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        TrackerError::Io {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for TrackerError {
    fn from(err: serde_yaml::Error) -> Self {
        TrackerError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for TrackerError {
    fn from(err: chrono::ParseError) -> Self {
        TrackerError::malformed_state("datetime", err.to_string().as_str())
    }
}
