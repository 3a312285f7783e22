//! Pass-through proxy to the analysis backend.
//!
//! The browser UI calls the backend's own paths on this server. Request bodies
//! and their content type go out unchanged; the upstream status, body and the
//! headers the UI relies on come back unchanged.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics::{normalize_path, PROXY_UPSTREAM_FAILURES};
use crate::state::AppState;

/// Response headers copied from the backend.
const FORWARDED_RESPONSE_HEADERS: [header::HeaderName; 2] =
    [header::CONTENT_TYPE, header::CONTENT_DISPOSITION];

/// Forward the request to the same path on the backend.
pub async fn forward(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let target = format!("{}{}", state.backend_url(), path_and_query);
    debug!("Proxying {} {} -> {}", method, uri.path(), target);

    let mut request = state.proxy_client().request(method, &target);
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type.clone());
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let upstream = match request.send().await {
        Ok(response) => response,
        Err(e) => return upstream_failure(uri.path(), &e),
    };

    let status = upstream.status();
    let mut forwarded = HeaderMap::new();
    for name in FORWARDED_RESPONSE_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            forwarded.insert(name, value.clone());
        }
    }

    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return upstream_failure(uri.path(), &e),
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = forwarded;
    response
}

fn upstream_failure(path: &str, err: &reqwest::Error) -> Response {
    warn!("Proxy request to {} failed: {}", path, err);
    PROXY_UPSTREAM_FAILURES
        .with_label_values(&[&normalize_path(path)])
        .inc();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
