//! HTTP surface of the orchestrator

pub mod machines;
pub mod nodes;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use crate::proxy;
use crate::state::AppState;

/// Assemble the full router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/nodes", get(nodes::list).post(nodes::register))
        .route("/nodes/:id", delete(nodes::deregister))
        .route("/nodes/:id/heartbeat", put(nodes::heartbeat))
        .route("/machines", get(machines::list).post(machines::create))
        .route("/machines/:name", delete(machines::destroy))
        .route("/proxy/:node_id", any(proxy::relay_root))
        .route("/proxy/:node_id/*subpath", any(proxy::relay))
        .with_state(state)
}

/// JSON error body shared by all routes
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
