//! Provisioning routes
//!
//! Thin forwarding to the active VM provider; the interesting state
//! machine lives behind [`nb_provider::VmProvider`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use nb_core::types::MachineSummary;
use nb_provider::ProviderError;

use super::error_response;
use crate::state::AppState;

#[derive(Serialize)]
struct MachinesResponse {
    machines: Vec<MachineSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateMachineRequest {
    #[serde(default)]
    name: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Response {
    match state.provider.list().await {
        Ok(machines) => Json(MachinesResponse { machines }).into_response(),
        Err(err) => provider_error(err),
    }
}

pub async fn create(
    State(state): State<AppState>,
    body: Option<Json<CreateMachineRequest>>,
) -> Response {
    let display_name = body.and_then(|Json(body)| body.name);

    match state.provider.create(display_name.as_deref()).await {
        Ok(provisioned) => {
            tracing::info!(
                "provisioned machine {} (node {})",
                provisioned.name,
                provisioned.node_id
            );
            (StatusCode::CREATED, Json(provisioned)).into_response()
        }
        Err(err) => provider_error(err),
    }
}

pub async fn destroy(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.provider.destroy(&name).await {
        Ok(()) => {
            tracing::info!("destroyed machine {}", name);
            StatusCode::OK.into_response()
        }
        Err(err) => provider_error(err),
    }
}

/// Map provider failures onto the HTTP surface: backend errors keep their
/// status, unreachable control planes become 502, everything else 500
fn provider_error(err: ProviderError) -> Response {
    let status = match &err {
        ProviderError::Api { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ProviderError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!("provider call failed: {}", err);
    error_response(status, err.to_string())
}
