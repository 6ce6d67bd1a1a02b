//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::analysis::{
    delete_analysis, get_analysis, list_analyses, start_analysis, stop_analysis,
    upload_analysis,
};
use crate::handlers::{health, model_status, ping};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let analysis_routes = Router::new()
        .route("/analysis", get(list_analyses))
        .route("/analysis/start", post(start_analysis))
        .route("/analysis/upload", post(upload_analysis))
        .route("/analysis/:id", get(get_analysis).delete(delete_analysis))
        .route("/analysis/:id/stop", post(stop_analysis));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/ping", get(ping))
        .route("/health/model", get(model_status));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let max_body_size = state.config.max_body_size;

    Router::new()
        .merge(analysis_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads are bounded by the video size limit, not axum's default
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
