//! Provider error types

use thiserror::Error;

/// Errors surfaced by the VM provider backends
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Structured error returned by a backend control plane
    #[error("provider API error ({code}): {message}")]
    Api {
        code: String,
        message: String,
        status: u16,
    },

    /// Control plane unreachable or the transport failed mid-request
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Boot payload exceeds the control plane's hard limit
    #[error("user data is {size} bytes, exceeding the {limit} byte limit")]
    UserDataTooLarge { size: usize, limit: usize },

    /// The resource reached a state it cannot recover from
    #[error("resource {name} entered terminal state {status:?}")]
    TerminalState { name: String, status: String },

    /// A bounded wait elapsed without the expected condition
    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    /// The control plane response is missing a field we depend on
    #[error("provider API returned no {0}")]
    MissingField(&'static str),
}

impl ProviderError {
    /// Status code reported by the backend, when there is one
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
