//! Sandbox backend provisioning tests
//!
//! Covers the create/resolve-url/exec/register flow, rollback on setup
//! failure, and destroy idempotency against an in-process control plane.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use nb_core::config::{SandboxConfig, SandboxPollConfig};
use nb_core::registry::NodeRegistry;
use nb_core::types::{NodeId, NodeRecord};
use nb_provider::provider::{node_id_for, VmProvider};
use nb_provider::sandbox::SandboxProvider;

#[derive(Default)]
struct MockSandboxes {
    sandboxes: HashSet<String>,
    /// Env blocks captured from exec calls, in order
    exec_envs: Vec<HashMap<String, String>>,
    /// When true, exec calls fail with a 500
    exec_failure: bool,
    deleted: Vec<String>,
}

type Shared = Arc<Mutex<MockSandboxes>>;

async fn create_sandbox(State(state): State<Shared>, Json(body): Json<serde_json::Value>) -> Response {
    let name = body["name"].as_str().unwrap().to_string();
    state.lock().unwrap().sandboxes.insert(name.clone());
    (
        StatusCode::CREATED,
        Json(json!({ "name": name, "status": "running" })),
    )
        .into_response()
}

async fn get_sandbox(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    if !state.lock().unwrap().sandboxes.contains(&name) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "not_found", "message": "no such sandbox" })),
        )
            .into_response();
    }
    Json(json!({
        "name": name,
        "status": "running",
        "url": format!("https://{name}.sandboxes.dev"),
    }))
    .into_response()
}

async fn exec_in_sandbox(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    if state.exec_failure {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "code": "exec_failed", "message": format!("boot failed in {name}") })),
        )
            .into_response();
    }

    let env: HashMap<String, String> =
        serde_json::from_value(body["env"].clone()).unwrap_or_default();
    state.exec_envs.push(env);

    Json(json!({ "stdout": "daemon started\n", "stderr": "" })).into_response()
}

async fn delete_sandbox(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    if !state.sandboxes.remove(&name) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "not_found", "message": "no such sandbox" })),
        )
            .into_response();
    }
    state.deleted.push(name);
    Json(json!({ "ok": true })).into_response()
}

async fn list_sandboxes(State(state): State<Shared>) -> Response {
    let state = state.lock().unwrap();
    let sandboxes: Vec<_> = state
        .sandboxes
        .iter()
        .map(|name| json!({ "name": name, "status": "running" }))
        .collect();
    Json(json!({ "sandboxes": sandboxes })).into_response()
}

async fn spawn_mock(state: Shared) -> String {
    let app = Router::new()
        .route("/sandboxes", post(create_sandbox).get(list_sandboxes))
        .route("/sandboxes/:name", get(get_sandbox).delete(delete_sandbox))
        .route("/sandboxes/:name/exec", post(exec_in_sandbox))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn provider_for(api_url: String, registry: Arc<NodeRegistry>) -> SandboxProvider {
    let config = SandboxConfig {
        token: Some("sbx-secret".to_string()),
        api_url,
        poll: SandboxPollConfig {
            register_interval: Duration::from_millis(10),
            register_timeout: Duration::from_millis(300),
        },
    };
    SandboxProvider::new(config, "https://fleet.example.com".to_string(), registry).unwrap()
}

fn record_for(node_id: NodeId, name: &str) -> NodeRecord {
    NodeRecord {
        id: node_id,
        name: name.to_string(),
        url: format!("https://{name}.sandboxes.dev:8080"),
        started_at: "2026-02-16T00:00:00Z".to_string(),
        os: "linux".to_string(),
        arch: "x86_64".to_string(),
        daemon_version: "0.1.0".to_string(),
        machine_name: Some(name.to_string()),
    }
}

/// Play the booted sandbox: register once the setup exec has run.
fn register_after_setup(mock: Shared, registry: Arc<NodeRegistry>, name: &str) {
    let name = name.to_string();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let setup_ran = !mock.lock().unwrap().exec_envs.is_empty();
            if setup_ran {
                let node_id = node_id_for(&name);
                registry.add(record_for(node_id, &name));
                break;
            }
        }
    });
}

#[tokio::test]
async fn test_create_runs_setup_and_waits_for_registration() {
    let mock: Shared = Arc::new(Mutex::new(MockSandboxes::default()));
    let api_url = spawn_mock(Arc::clone(&mock)).await;
    let registry = Arc::new(NodeRegistry::default());
    let provider = provider_for(api_url, Arc::clone(&registry));

    register_after_setup(Arc::clone(&mock), Arc::clone(&registry), "nimbus-demo");

    let provisioned = provider.create(Some("demo")).await.expect("created");
    assert_eq!(provisioned.name, "nimbus-demo");
    assert_eq!(provisioned.node_id.as_str(), "nimbus-demo-8080");
    assert!(registry.get(&provisioned.node_id).is_some());

    // The setup exec was parameterized with the callback and public URLs.
    let envs = mock.lock().unwrap().exec_envs.clone();
    assert_eq!(envs.len(), 1);
    assert_eq!(
        envs[0].get("NIMBUS_SERVER_URL").map(String::as_str),
        Some("https://fleet.example.com")
    );
    assert_eq!(
        envs[0].get("NIMBUS_PUBLIC_URL").map(String::as_str),
        Some("https://nimbus-demo.sandboxes.dev")
    );
    assert_eq!(
        envs[0].get("NIMBUS_PROXY_PORT").map(String::as_str),
        Some("8080")
    );
}

#[tokio::test]
async fn test_create_rolls_back_when_setup_fails() {
    let mock: Shared = Arc::new(Mutex::new(MockSandboxes {
        exec_failure: true,
        ..MockSandboxes::default()
    }));
    let api_url = spawn_mock(Arc::clone(&mock)).await;
    let registry = Arc::new(NodeRegistry::default());
    let provider = provider_for(api_url, registry);

    let err = provider.create(Some("broken")).await.expect_err("setup fails");
    assert_eq!(err.status(), Some(500));

    let state = mock.lock().unwrap();
    assert_eq!(state.deleted, vec!["nimbus-broken".to_string()]);
    assert!(state.sandboxes.is_empty());
}

#[tokio::test]
async fn test_create_rolls_back_when_node_never_registers() {
    let mock: Shared = Arc::new(Mutex::new(MockSandboxes::default()));
    let api_url = spawn_mock(Arc::clone(&mock)).await;
    let registry = Arc::new(NodeRegistry::default());
    let provider = provider_for(api_url, registry);

    let err = provider.create(Some("silent")).await.expect_err("times out");
    assert!(err.to_string().contains("self-register"));
    assert_eq!(
        mock.lock().unwrap().deleted,
        vec!["nimbus-silent".to_string()]
    );
}

#[tokio::test]
async fn test_destroy_tolerates_missing_sandbox() {
    let mock: Shared = Arc::new(Mutex::new(MockSandboxes::default()));
    let api_url = spawn_mock(Arc::clone(&mock)).await;
    let registry = Arc::new(NodeRegistry::default());

    let node_id = node_id_for("nimbus-gone");
    registry.add(record_for(node_id.clone(), "nimbus-gone"));

    let provider = provider_for(api_url, Arc::clone(&registry));
    provider.destroy("nimbus-gone").await.expect("no error");

    // The registry entry is cleared even though the sandbox was already gone.
    assert!(registry.get(&node_id).is_none());
}

#[tokio::test]
async fn test_list_projects_sandboxes() {
    let mock: Shared = Arc::new(Mutex::new(MockSandboxes::default()));
    mock.lock()
        .unwrap()
        .sandboxes
        .insert("nimbus-alpha".to_string());
    let api_url = spawn_mock(Arc::clone(&mock)).await;
    let registry = Arc::new(NodeRegistry::default());
    let provider = provider_for(api_url, registry);

    let machines = provider.list().await.expect("listed");
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].name, "nimbus-alpha");
    assert_eq!(machines[0].status.as_deref(), Some("running"));
}
