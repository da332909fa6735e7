//! Node registry routes
//!
//! Nodes drive their own lifecycle here: a booted daemon POSTs its record,
//! keeps it alive with heartbeats, and is forgotten when its TTL lapses.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use nb_core::types::{NodeId, NodeRecord};

use super::error_response;
use crate::state::AppState;

#[derive(Serialize)]
struct NodesResponse {
    nodes: Vec<NodeRecord>,
}

pub async fn list(State(state): State<AppState>) -> Response {
    Json(NodesResponse {
        nodes: state.registry.list(),
    })
    .into_response()
}

/// Self-registration payload; only `id` and `url` are mandatory
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterNodeRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    arch: Option<String>,
    #[serde(default)]
    daemon_version: Option<String>,
    #[serde(default)]
    machine_name: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    body: Option<Json<RegisterNodeRequest>>,
) -> Response {
    let Some(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "invalid registration payload");
    };

    let (Some(id), Some(url)) = (non_empty(body.id), non_empty(body.url)) else {
        return error_response(StatusCode::BAD_REQUEST, "missing required fields: id, url");
    };

    let record = NodeRecord {
        id: NodeId::new(id),
        name: body.name.unwrap_or_default(),
        url,
        started_at: body.started_at.unwrap_or_default(),
        os: body.os.unwrap_or_default(),
        arch: body.arch.unwrap_or_default(),
        daemon_version: body.daemon_version.unwrap_or_default(),
        machine_name: body.machine_name,
    };

    tracing::info!("node {} registered at {}", record.id, record.url);
    state.registry.add(record);
    StatusCode::CREATED.into_response()
}

pub async fn deregister(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    state.registry.remove(&NodeId::new(id));
    StatusCode::OK.into_response()
}

pub async fn heartbeat(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = NodeId::new(id);
    if state.registry.refresh_ttl(&id) {
        StatusCode::OK.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("node {id} not found"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
