//! Sandbox micro-VM backend configuration

use std::time::Duration;

use super::env_opt;

/// Settings for the sandboxed micro-VM backend
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// API token; required when this backend is active, and also attached
    /// to proxied requests targeting the sandbox network
    pub token: Option<String>,
    /// Control plane base URL
    pub api_url: String,
    /// Polling tuning
    pub poll: SandboxPollConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.sandboxes.dev/v1".to_string(),
            poll: SandboxPollConfig::default(),
        }
    }
}

impl SandboxConfig {
    pub(super) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            token: env_opt("NIMBUS_SANDBOX_TOKEN"),
            api_url: env_opt("NIMBUS_SANDBOX_API_URL").unwrap_or(defaults.api_url),
            poll: SandboxPollConfig::default(),
        }
    }
}

/// Polling intervals and bounds for sandbox provisioning
#[derive(Debug, Clone, Copy)]
pub struct SandboxPollConfig {
    /// Interval between registry polls for self-registration
    pub register_interval: Duration,
    /// Overall bound on waiting for self-registration
    pub register_timeout: Duration,
}

impl Default for SandboxPollConfig {
    fn default() -> Self {
        Self {
            register_interval: Duration::from_secs(2),
            register_timeout: Duration::from_secs(45),
        }
    }
}
