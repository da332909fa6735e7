//! Streaming reverse proxy gateway
//!
//! Resolves a node id through the registry and relays the request to the
//! node's base URL, streaming both bodies. Nothing is buffered, so
//! long-lived event streams reach the client as the upstream produces
//! them. The active provider gets a chance to attach credentials when the
//! target sits on its private network.
//!
//! Proxying is request-scoped and stateless: no retries, and a client
//! that disconnects mid-stream drops the upstream transfer with it.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::Response;
use reqwest::Url;

use nb_core::types::NodeId;

use crate::routes::error_response;
use crate::state::AppState;

/// `ANY /proxy/:node_id`
pub async fn relay_root(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    req: Request,
) -> Response {
    forward(state, node_id, String::new(), req).await
}

/// `ANY /proxy/:node_id/*subpath`
pub async fn relay(
    State(state): State<AppState>,
    Path((node_id, subpath)): Path<(String, String)>,
    req: Request,
) -> Response {
    forward(state, node_id, subpath, req).await
}

async fn forward(state: AppState, node_id: String, subpath: String, req: Request) -> Response {
    let id = NodeId::new(node_id);
    let Some(record) = state.registry.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, format!("node {id} not registered"));
    };

    let raw_target = join_target(&record.url, &subpath, req.uri().query());
    let target = match Url::parse(&raw_target) {
        Ok(target) => target,
        Err(err) => {
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("invalid node url {raw_target:?}: {err}"),
            );
        }
    };

    let method = req.method().clone();
    let mut headers = req.headers().clone();
    // The upstream connection computes its own framing headers.
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONNECTION);

    state.provider.inject_proxy_auth(&target, &mut headers);

    let mut upstream_req = state.http.request(method.clone(), target).headers(headers);
    if method != Method::GET && method != Method::HEAD {
        // Relay the body as it arrives; large uploads never materialize here.
        upstream_req =
            upstream_req.body(reqwest::Body::wrap_stream(req.into_body().into_data_stream()));
    }

    let upstream = match upstream_req.send().await {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!("proxy to node {} failed: {}", id, err);
            return error_response(StatusCode::BAD_GATEWAY, format!("upstream unreachable: {err}"));
        }
    };

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    // The body is re-framed on this connection; drop headers that would
    // misdescribe what actually goes out.
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Join a node's base URL with the proxied subpath and query string
fn join_target(base: &str, subpath: &str, query: Option<&str>) -> String {
    let mut target = base.trim_end_matches('/').to_string();
    if !subpath.is_empty() {
        target.push('/');
        target.push_str(subpath);
    }
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }
    target
}
