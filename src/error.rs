//! Error types for multiwait
//!
//! Construction-time failures (bad parameters, unknown or conflicting
//! condition names, malformed specifications) abort batch setup and are
//! reported through [`Error`]. Failures while waiting are never errors at
//! this level; they become [`crate::engine::Outcome`] values instead.

use thiserror::Error;

/// Core error type for condition setup and batch execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Missing required parameter, unknown parameter, or a parameter value
    /// the condition type cannot use
    #[error("invalid configuration for condition '{condition}': {message}")]
    Configuration { condition: String, message: String },

    /// Two different condition types registered under one name
    #[error("cannot register {requested} as '{name}': {existing} is already registered under that name")]
    NameConflict {
        name: String,
        existing: String,
        requested: String,
    },

    /// A specification names a condition type that is not registered
    #[error("unknown condition: {0}")]
    UnknownCondition(String),

    /// A specification entry is neither a bare name nor a single-key mapping
    #[error("invalid condition specification at index {index}: {reason}")]
    InvalidSpecification { index: usize, reason: String },

    /// The settings document could not be read or parsed
    #[error("settings error: {0}")]
    Settings(String),

    /// The batch was interrupted before every condition resolved
    #[error("wait cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a configuration error on a named condition
    pub fn configuration(condition: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            condition: condition.into(),
            message: message.into(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
