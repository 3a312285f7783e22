use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, middleware::metrics_middleware, proxy, session};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let ui_dir = state.config().server.ui_dir.clone();
    let cors = cors_layer(&state.config().server.allowed_origins);

    let routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Session (orchestrator)
        .route("/api/session", get(session::get_session))
        .route("/api/session/submit", post(session::submit))
        .route("/api/session/continue", post(session::confirm_download))
        .route("/api/session/fields", put(session::select_fields))
        .route("/api/session/fields/{id}/toggle", post(session::toggle_field))
        .route("/api/session/extract", post(session::start_extraction))
        .route("/api/session/results/reload", post(session::reload_results))
        .route("/api/session/matching/retry", post(session::retry_matching))
        .route("/api/session/reset", post(session::reset))
        .route("/api/session/metadata-fields", get(session::metadata_fields))
        .route("/api/session/jobs", get(session::list_jobs))
        // Pass-through to the analysis backend
        .route("/api/discover-syllabi", post(proxy::forward))
        .route("/api/job-status/{job_id}", get(proxy::forward))
        .route("/api/metadata-fields", get(proxy::forward))
        .route("/api/jobs", get(proxy::forward))
        .route("/api/extract-metadata", post(proxy::forward))
        .route("/api/results/{job_id}", get(proxy::forward))
        .route("/api/check-primo/{job_id}", post(proxy::forward))
        .route("/api/download-results/{job_id}", get(proxy::forward))
        .route("/api/download-csv/{job_id}", get(proxy::forward))
        .with_state(state);

    // Serve the UI with SPA fallback
    let index_path = ui_dir.join("index.html");
    let serve_dir = ServeDir::new(&ui_dir).fallback(ServeFile::new(index_path));

    let router = routes
        .fallback_service(serve_dir)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS for the configured origins; `None` when no origin is configured.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([axum::http::header::CONTENT_DISPOSITION]),
    )
}
