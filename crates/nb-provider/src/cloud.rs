//! Metered cloud VM backend
//!
//! Talks to a droplet-style REST control plane: named machines created with
//! boot user-data, tagged for discovery, polled until they report `active`.
//! The machine's own daemon performs the final step by self-registering
//! against the orchestrator's callback URL; creation only succeeds once
//! that registration is visible in the registry.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::json;

use nb_core::config::CloudConfig;
use nb_core::registry::NodeRegistry;
use nb_core::retry::RetryPolicy;
use nb_core::types::{MachineSummary, NodeId, Provisioned};
use nb_core::ConfigError;

use crate::error::ProviderError;
use crate::provider::{machine_name, node_id_for, VmProvider, NAME_PREFIX};

/// Hard ceiling the control plane places on boot user-data
const USER_DATA_LIMIT: usize = 64 * 1024;

/// Boot script for fresh machines; the callback URL is substituted in
const SETUP_SCRIPT: &str = include_str!("../scripts/setup-cloud.sh");

/// VM provider backed by a metered cloud control plane
pub struct CloudVmProvider {
    http: reqwest::Client,
    config: CloudConfig,
    token: String,
    public_url: String,
    registry: Arc<NodeRegistry>,
}

#[derive(Debug, Deserialize)]
struct Droplet {
    id: u64,
    name: String,
    status: String,
    #[serde(default)]
    networks: Option<Networks>,
}

#[derive(Debug, Deserialize, Default)]
struct Networks {
    #[serde(default)]
    v4: Vec<V4Network>,
}

#[derive(Debug, Deserialize)]
struct V4Network {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Debug, Deserialize)]
struct DropletListEnvelope {
    droplets: Vec<Droplet>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    id: Option<String>,
    message: Option<String>,
}

impl CloudVmProvider {
    /// Build the backend, validating its credential is present
    pub fn new(
        config: CloudConfig,
        public_url: String,
        registry: Arc<NodeRegistry>,
    ) -> Result<Self, ConfigError> {
        let token = config
            .token
            .clone()
            .ok_or(ConfigError::MissingVar("NIMBUS_CLOUD_TOKEN"))?;
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            token,
            public_url,
            registry,
        })
    }

    async fn api(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.config.api_url, path);
        let mut request = self.http.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let err: ApiErrorBody = response.json().await.unwrap_or_default();
        Err(ProviderError::Api {
            code: err.id.unwrap_or_else(|| "unknown".to_string()),
            message: err
                .message
                .unwrap_or_else(|| format!("cloud API error: {status}")),
            status,
        })
    }

    async fn submit_create(&self, name: &str, user_data: &str) -> Result<Droplet, ProviderError> {
        let body = json!({
            "name": name,
            "region": self.config.region,
            "size": self.config.size,
            "image": self.config.image,
            "user_data": user_data,
            "tags": [NAME_PREFIX],
        });
        let envelope: DropletEnvelope = self
            .api(Method::POST, "/droplets", Some(body))
            .await?
            .json()
            .await?;
        Ok(envelope.droplet)
    }

    /// Poll the control plane until the machine is active and has a public
    /// address, it enters a terminal state, or the wait times out
    async fn wait_for_active(&self, droplet_id: u64, name: &str) -> Result<String, ProviderError> {
        let poll = &self.config.poll;
        let deadline = tokio::time::Instant::now() + poll.active_timeout;

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(poll.active_interval).await;

            let envelope: DropletEnvelope = self
                .api(Method::GET, &format!("/droplets/{droplet_id}"), None)
                .await?
                .json()
                .await?;
            let droplet = envelope.droplet;

            match droplet.status.as_str() {
                "active" => {
                    let public = droplet
                        .networks
                        .unwrap_or_default()
                        .v4
                        .into_iter()
                        .find(|n| n.kind == "public");
                    // Address assignment can lag the status flip; keep polling.
                    if let Some(public) = public {
                        return Ok(public.ip_address);
                    }
                }
                "off" | "archive" => {
                    return Err(ProviderError::TerminalState {
                        name: name.to_string(),
                        status: droplet.status,
                    });
                }
                _ => {}
            }
        }

        Err(ProviderError::Timeout {
            what: format!("machine {name} to become active"),
            secs: poll.active_timeout.as_secs(),
        })
    }

    /// Poll the registry until the node's daemon has self-registered
    async fn wait_for_registration(&self, node_id: &NodeId) -> Result<(), ProviderError> {
        let poll = &self.config.poll;
        let deadline = tokio::time::Instant::now() + poll.register_timeout;

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(poll.register_interval).await;
            if self.registry.exists(node_id) {
                return Ok(());
            }
        }

        Err(ProviderError::Timeout {
            what: format!("node {node_id} to self-register"),
            secs: poll.register_timeout.as_secs(),
        })
    }

    async fn wait_until_registered(
        &self,
        droplet_id: u64,
        name: &str,
    ) -> Result<NodeId, ProviderError> {
        let ip = self.wait_for_active(droplet_id, name).await?;
        tracing::info!("machine {} active at {}", name, ip);

        let node_id = node_id_for(name);
        self.wait_for_registration(&node_id).await?;
        Ok(node_id)
    }

    async fn delete_droplet(&self, droplet_id: u64) -> Result<(), ProviderError> {
        self.api(Method::DELETE, &format!("/droplets/{droplet_id}"), None)
            .await?;
        Ok(())
    }

    async fn tagged_droplets(&self) -> Result<Vec<Droplet>, ProviderError> {
        let envelope: DropletListEnvelope = self
            .api(
                Method::GET,
                &format!("/droplets?tag_name={NAME_PREFIX}&per_page=200"),
                None,
            )
            .await?
            .json()
            .await?;
        Ok(envelope.droplets)
    }
}

#[async_trait]
impl VmProvider for CloudVmProvider {
    async fn create(&self, display_name: Option<&str>) -> Result<Provisioned, ProviderError> {
        let name = machine_name(display_name, true);
        let user_data = render_user_data(SETUP_SCRIPT, &self.public_url)?;

        let policy = RetryPolicy::new(
            self.config.poll.create_max_retries,
            self.config.poll.create_retry_delay,
        );
        let droplet = policy
            .run(|| self.submit_create(&name, &user_data), is_finalizing)
            .await?;
        tracing::info!("submitted machine {} (droplet {})", name, droplet.id);

        match self.wait_until_registered(droplet.id, &name).await {
            Ok(node_id) => Ok(Provisioned { name, node_id }),
            Err(err) => {
                // Cleanup must not mask the failure that triggered it.
                if let Err(cleanup) = self.delete_droplet(droplet.id).await {
                    tracing::warn!(
                        "rollback delete of droplet {} failed: {}",
                        droplet.id,
                        cleanup
                    );
                }
                Err(err)
            }
        }
    }

    async fn destroy(&self, name: &str) -> Result<(), ProviderError> {
        self.registry.remove(&node_id_for(name));

        let droplets = self.tagged_droplets().await?;
        let Some(droplet) = droplets.into_iter().find(|d| d.name == name) else {
            return Ok(());
        };

        match self.delete_droplet(droplet.id).await {
            Err(ProviderError::Api { status: 404, .. }) => Ok(()),
            other => other,
        }
    }

    async fn list(&self) -> Result<Vec<MachineSummary>, ProviderError> {
        let droplets = self.tagged_droplets().await?;
        Ok(droplets
            .into_iter()
            .map(|d| MachineSummary {
                name: d.name,
                status: Some(d.status),
            })
            .collect())
    }

    /// Cloud machines are reached directly at their public address; no
    /// credential is injected
    fn inject_proxy_auth(&self, _target: &Url, _headers: &mut HeaderMap) {}
}

/// The one transient create rejection worth retrying: accounts still being
/// finalized on the provider side
fn is_finalizing(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Api { message, .. } if message.to_lowercase().contains("finalizing")
    )
}

/// Substitute the orchestrator callback URL into the boot script and
/// enforce the control plane's payload ceiling before submitting
fn render_user_data(script: &str, public_url: &str) -> Result<String, ProviderError> {
    let rendered = script.replace("__NIMBUS_SERVER_URL__", public_url);
    if rendered.len() >= USER_DATA_LIMIT {
        return Err(ProviderError::UserDataTooLarge {
            size: rendered.len(),
            limit: USER_DATA_LIMIT,
        });
    }
    Ok(rendered)
}
