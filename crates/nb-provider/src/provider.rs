//! The VM provider capability

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Url;

use nb_core::types::{MachineSummary, NodeId, Provisioned};

use crate::error::ProviderError;

/// Port the agent daemon listens on inside a provisioned machine
pub const DAEMON_PORT: u16 = 8080;

/// Reserved prefix for every resource this orchestrator provisions
pub const NAME_PREFIX: &str = "nimbus";

/// Abstraction over a backend that can create, destroy, and enumerate the
/// external compute resources backing nodes
///
/// `create` resolves only once the booted node has self-registered; the
/// caller receives a node id it can immediately look up in the registry.
#[async_trait]
pub trait VmProvider: Send + Sync {
    /// Provision a machine, optionally deriving its name from a display name
    async fn create(&self, display_name: Option<&str>) -> Result<Provisioned, ProviderError>;

    /// Tear down a machine by resource name; succeeds if it is already gone
    async fn destroy(&self, name: &str) -> Result<(), ProviderError>;

    /// Enumerate this orchestrator's resources at the backend
    async fn list(&self) -> Result<Vec<MachineSummary>, ProviderError>;

    /// Attach backend credentials to a proxied request when the target host
    /// is on the backend's private network; otherwise leave headers alone
    fn inject_proxy_auth(&self, target: &Url, headers: &mut HeaderMap);
}

/// Registry id a machine's daemon will register under
pub fn node_id_for(name: &str) -> NodeId {
    NodeId::new(format!("{name}-{DAEMON_PORT}"))
}

/// Derive a resource name from an optional display name
///
/// Display names are slugged to lowercase alphanumerics and dashes,
/// truncated to 30 characters; absent a display name, a random 8-character
/// stand-in is used. A 6-character random suffix keeps repeated names from
/// colliding when the backend requires it.
pub fn machine_name(display_name: Option<&str>, random_suffix: bool) -> String {
    let slug = match display_name {
        Some(display) => slugify(display),
        None => random_chars(8),
    };

    if random_suffix {
        format!("{NAME_PREFIX}-{slug}-{}", random_chars(6))
    } else {
        format!("{NAME_PREFIX}-{slug}")
    }
}

fn slugify(display: &str) -> String {
    let mut slug = String::with_capacity(display.len());
    let mut last_dash = false;
    for c in display.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(30);
    slug
}

fn random_chars(len: usize) -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(len)
        .collect()
}
