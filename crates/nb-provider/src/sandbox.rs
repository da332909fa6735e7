//! Sandboxed micro-VM backend
//!
//! Sandboxes boot in seconds, so there is no status-polling phase: the
//! control plane creates the sandbox synchronously, a secondary lookup
//! resolves its public URL (the creation response omits it), and a setup
//! script launched through the control plane's exec primitive installs and
//! starts the daemon. Creation then waits for the daemon to self-register.
//!
//! Sandboxes sit behind the provider's private network, so the proxy
//! gateway asks this backend to attach the API token to requests bound for
//! sandbox hosts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::json;

use nb_core::config::SandboxConfig;
use nb_core::registry::NodeRegistry;
use nb_core::types::{MachineSummary, NodeId, Provisioned};
use nb_core::ConfigError;

use crate::error::ProviderError;
use crate::provider::{machine_name, node_id_for, VmProvider, DAEMON_PORT, NAME_PREFIX};

/// Domains on the sandbox provider's private network; requests proxied to
/// these hosts need the API token attached
const PRIVATE_HOST_SUFFIXES: &[&str] = &[".sandboxes.dev", ".sandboxes.app"];

/// Setup script executed inside a fresh sandbox
const SETUP_SCRIPT: &str = include_str!("../scripts/setup-sandbox.sh");

/// VM provider backed by sandboxed micro-VMs
pub struct SandboxProvider {
    http: reqwest::Client,
    config: SandboxConfig,
    token: String,
    public_url: String,
    registry: Arc<NodeRegistry>,
}

#[derive(Debug, Deserialize)]
struct Sandbox {
    name: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SandboxDetail {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SandboxListEnvelope {
    sandboxes: Vec<Sandbox>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecResult {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl SandboxProvider {
    /// Build the backend, validating its credential is present
    pub fn new(
        config: SandboxConfig,
        public_url: String,
        registry: Arc<NodeRegistry>,
    ) -> Result<Self, ConfigError> {
        let token = config
            .token
            .clone()
            .ok_or(ConfigError::MissingVar("NIMBUS_SANDBOX_TOKEN"))?;
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
            code: err.code.unwrap_or_else(|| "unknown".to_string()),
            message: err
                .message
                .unwrap_or_else(|| format!("sandbox API error: {status}")),
            status,
        })
    }

    /// The creation response does not carry the sandbox's public URL;
    /// resolve it with a follow-up lookup
    async fn resolve_url(&self, name: &str) -> Result<String, ProviderError> {
        let detail: SandboxDetail = self
            .api(Method::GET, &format!("/sandboxes/{name}"), None)
            .await?
            .json()
            .await?;
        detail.url.ok_or(ProviderError::MissingField("url"))
    }

    /// Install and launch the daemon inside the sandbox
    async fn run_setup(&self, name: &str, public_url: &str) -> Result<(), ProviderError> {
        let env: HashMap<&str, String> = HashMap::from([
            ("NIMBUS_SERVER_URL", self.public_url.clone()),
            ("NIMBUS_PUBLIC_URL", public_url.to_string()),
            ("NIMBUS_PROXY_PORT", DAEMON_PORT.to_string()),
        ]);
        let body = json!({
            "command": "bash",
            "args": ["-c", SETUP_SCRIPT],
            "env": env,
        });

        let result: ExecResult = self
            .api(Method::POST, &format!("/sandboxes/{name}/exec"), Some(body))
            .await?
            .json()
            .await?;

        tracing::debug!("sandbox {} setup stdout: {}", name, result.stdout.trim());
        if !result.stderr.is_empty() {
            tracing::warn!("sandbox {} setup stderr: {}", name, result.stderr.trim());
        }
        Ok(())
    }

    /// Poll the registry until the sandbox's daemon has self-registered
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

    /// Everything after the sandbox exists; failures here trigger rollback
    async fn bootstrap(&self, name: &str) -> Result<NodeId, ProviderError> {
        let public_url = self.resolve_url(name).await?;
        self.run_setup(name, &public_url).await?;

        let node_id = node_id_for(name);
        self.wait_for_registration(&node_id).await?;
        Ok(node_id)
    }

    async fn delete_sandbox(&self, name: &str) -> Result<(), ProviderError> {
        match self
            .api(Method::DELETE, &format!("/sandboxes/{name}"), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(ProviderError::Api { status: 404, .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl VmProvider for SandboxProvider {
    async fn create(&self, display_name: Option<&str>) -> Result<Provisioned, ProviderError> {
        let name = machine_name(display_name, false);

        let sandbox: Sandbox = self
            .api(Method::POST, "/sandboxes", Some(json!({ "name": name })))
            .await?
            .json()
            .await?;
        tracing::info!("created sandbox {}", sandbox.name);

        match self.bootstrap(&name).await {
            Ok(node_id) => Ok(Provisioned { name, node_id }),
            Err(err) => {
                // Cleanup must not mask the failure that triggered it.
                if let Err(cleanup) = self.delete_sandbox(&name).await {
                    tracing::warn!("rollback delete of sandbox {} failed: {}", name, cleanup);
                }
                Err(err)
            }
        }
    }

    async fn destroy(&self, name: &str) -> Result<(), ProviderError> {
        self.registry.remove(&node_id_for(name));
        self.delete_sandbox(name).await
    }

    async fn list(&self) -> Result<Vec<MachineSummary>, ProviderError> {
        let envelope: SandboxListEnvelope = self
            .api(
                Method::GET,
                &format!("/sandboxes?prefix={NAME_PREFIX}-"),
                None,
            )
            .await?
            .json()
            .await?;
        Ok(envelope
            .sandboxes
            .into_iter()
            .map(|s| MachineSummary {
                name: s.name,
                status: s.status,
            })
            .collect())
    }

    fn inject_proxy_auth(&self, target: &Url, headers: &mut HeaderMap) {
        let Some(host) = target.host_str() else {
            return;
        };
        if !PRIVATE_HOST_SUFFIXES.iter().any(|s| host.ends_with(s)) {
            return;
        }
        if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
    }
}
