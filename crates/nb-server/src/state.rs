//! Shared HTTP state

use std::sync::Arc;
use std::time::Instant;

use nb_core::registry::NodeRegistry;
use nb_provider::VmProvider;

/// State threaded through every route handler
///
/// The provider is chosen once at startup; handlers only ever see the
/// capability trait.
#[derive(Clone)]
pub struct AppState {
    /// TTL node registry
    pub registry: Arc<NodeRegistry>,
    /// Active VM provider backend
    pub provider: Arc<dyn VmProvider>,
    /// Client used for proxying to nodes
    pub http: reqwest::Client,
    /// When the daemon started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(registry: Arc<NodeRegistry>, provider: Arc<dyn VmProvider>) -> Self {
        Self {
            registry,
            provider,
            http: reqwest::Client::new(),
            start_time: Instant::now(),
        }
    }
}
