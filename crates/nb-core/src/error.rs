//! Core error types for Nimbus

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is not set
    #[error("{0} not set")]
    MissingVar(&'static str),

    /// Environment variable holds an unusable value
    #[error("invalid value for {name}: {value:?}")]
    InvalidVar { name: &'static str, value: String },

    /// Configured provider backend is not recognized
    #[error("unknown provider: {0} (available: cloud, sandbox)")]
    UnknownProvider(String),
}
