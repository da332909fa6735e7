//! Environment-sourced configuration
//!
//! The orchestrator is configured entirely through environment variables so
//! it can run unmodified under a process supervisor or a container runtime.
//! Every knob has a default except the credentials and the public callback
//! URL, which are validated when the active provider backend is built.

mod cloud;
mod sandbox;

pub use cloud::{CloudConfig, CloudPollConfig};
pub use sandbox::{SandboxConfig, SandboxPollConfig};

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Which VM provider backend is active for this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Metered cloud virtual machines
    Cloud,
    /// Sandboxed micro-VMs
    Sandbox,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud" => Ok(ProviderKind::Cloud),
            "sandbox" => Ok(ProviderKind::Sandbox),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Top-level configuration for the orchestrator process
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP surface binds to
    pub bind_address: String,
    /// Externally reachable base URL of this orchestrator, handed to booted
    /// nodes so they can self-register
    pub public_url: Option<String>,
    /// Active provider backend
    pub provider: ProviderKind,
    /// Heartbeat window for registry entries
    pub node_ttl: Duration,
    /// Cloud VM backend settings
    pub cloud: CloudConfig,
    /// Sandbox backend settings
    pub sandbox: SandboxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_url: None,
            provider: ProviderKind::Sandbox,
            node_ttl: crate::registry::DEFAULT_NODE_TTL,
            cloud: CloudConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Config {
    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(bind) = env_opt("NIMBUS_BIND") {
            config.bind_address = bind;
        }
        config.public_url = env_opt("NIMBUS_PUBLIC_URL");

        if let Some(provider) = env_opt("NIMBUS_PROVIDER") {
            config.provider = provider.parse()?;
        }

        if let Some(ttl) = env_opt("NIMBUS_NODE_TTL_SECS") {
            let secs: u64 = ttl.parse().map_err(|_| ConfigError::InvalidVar {
                name: "NIMBUS_NODE_TTL_SECS",
                value: ttl,
            })?;
            config.node_ttl = Duration::from_secs(secs);
        }

        config.cloud = CloudConfig::from_env();
        config.sandbox = SandboxConfig::from_env();

        Ok(config)
    }

    /// The callback base URL, required by both provider backends
    pub fn public_url(&self) -> Result<&str, ConfigError> {
        self.public_url
            .as_deref()
            .ok_or(ConfigError::MissingVar("NIMBUS_PUBLIC_URL"))
    }
}

/// Read an environment variable, treating empty values as unset
pub(crate) fn env_opt(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
