//! Cloud VM backend configuration

use std::time::Duration;

use super::env_opt;

/// Settings for the metered cloud VM backend
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// API token; required when this backend is active
    pub token: Option<String>,
    /// Control plane base URL
    pub api_url: String,
    /// Datacenter region for new machines
    pub region: String,
    /// Machine size slug
    pub size: String,
    /// Base image slug
    pub image: String,
    /// Polling and retry tuning
    pub poll: CloudPollConfig,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.digitalocean.com/v2".to_string(),
            region: "nyc1".to_string(),
            size: "s-1vcpu-2gb".to_string(),
            image: "ubuntu-24-04-x64".to_string(),
            poll: CloudPollConfig::default(),
        }
    }
}

impl CloudConfig {
    pub(super) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            token: env_opt("NIMBUS_CLOUD_TOKEN"),
            api_url: env_opt("NIMBUS_CLOUD_API_URL").unwrap_or(defaults.api_url),
            region: env_opt("NIMBUS_CLOUD_REGION").unwrap_or(defaults.region),
            size: env_opt("NIMBUS_CLOUD_SIZE").unwrap_or(defaults.size),
            image: env_opt("NIMBUS_CLOUD_IMAGE").unwrap_or(defaults.image),
            poll: CloudPollConfig::default(),
        }
    }
}

/// Polling intervals and bounds for cloud VM provisioning
///
/// Not environment-driven; tests shrink these to milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct CloudPollConfig {
    /// Retries allowed for the transient create-rejection
    pub create_max_retries: u32,
    /// Delay between create retries
    pub create_retry_delay: Duration,
    /// Interval between resource status polls
    pub active_interval: Duration,
    /// Overall bound on waiting for the resource to become active
    pub active_timeout: Duration,
    /// Interval between registry polls for self-registration
    pub register_interval: Duration,
    /// Overall bound on waiting for self-registration
    pub register_timeout: Duration,
}

impl Default for CloudPollConfig {
    fn default() -> Self {
        Self {
            create_max_retries: 10,
            create_retry_delay: Duration::from_secs(5),
            active_interval: Duration::from_secs(3),
            active_timeout: Duration::from_secs(600),
            register_interval: Duration::from_secs(5),
            register_timeout: Duration::from_secs(600),
        }
    }
}
