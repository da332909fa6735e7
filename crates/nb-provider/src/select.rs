//! Startup-time provider selection
//!
//! One backend is active for the lifetime of the process. The factory is
//! invoked exactly once from `main`; the resulting handle is threaded into
//! the HTTP state so nothing downstream depends on a concrete backend.

use std::sync::Arc;

use nb_core::config::{Config, ProviderKind};
use nb_core::registry::NodeRegistry;
use nb_core::ConfigError;

use crate::cloud::CloudVmProvider;
use crate::provider::VmProvider;
use crate::sandbox::SandboxProvider;

/// Build the configured provider backend
///
/// Fails fast when the chosen backend's credential or the public callback
/// URL is missing, so a misconfigured process never reaches the listener.
pub fn build_provider(
    config: &Config,
    registry: Arc<NodeRegistry>,
) -> Result<Arc<dyn VmProvider>, ConfigError> {
    let public_url = config.public_url()?.to_string();

    match config.provider {
        ProviderKind::Cloud => {
            let provider = CloudVmProvider::new(config.cloud.clone(), public_url, registry)?;
            Ok(Arc::new(provider))
        }
        ProviderKind::Sandbox => {
            let provider = SandboxProvider::new(config.sandbox.clone(), public_url, registry)?;
            Ok(Arc::new(provider))
        }
    }
}
