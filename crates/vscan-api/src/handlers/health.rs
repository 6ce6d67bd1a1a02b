//! Health check handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use vscan_models::SUPPORTED_VIDEO_FORMATS;

use crate::state::AppState;

/// Health response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` while the backend is not ready
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub backend: BackendStatus,
    pub active_analyses: usize,
    pub accepting_jobs: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: String,
    pub ready: bool,
}

/// Health check endpoint. Always 200; degradation is reported in the body.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = state.service.backend();
    let ready = backend.is_ready();

    Json(HealthResponse {
        status: if ready { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        backend: BackendStatus {
            name: backend.name().to_string(),
            ready,
        },
        active_analyses: state.service.active_slots(),
        accepting_jobs: state.service.is_accepting(),
    })
}

/// Model status response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelStatusResponse {
    pub loaded: bool,
    pub model_info: ModelInfo,
    pub supported_formats: Vec<String>,
    /// Threshold applied when a request gives none
    pub confidence_threshold: f64,
    pub frame_interval_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub backend: String,
    pub supports_cancellation: bool,
    pub batch_size: usize,
}

/// Inference model status and the defaults jobs run with.
pub async fn model_status(State(state): State<AppState>) -> Json<ModelStatusResponse> {
    let backend = state.service.backend();
    let defaults = state.service.default_settings();

    Json(ModelStatusResponse {
        loaded: backend.is_ready(),
        model_info: ModelInfo {
            backend: backend.name().to_string(),
            supports_cancellation: backend.supports_cancellation(),
            batch_size: state.service.config().batch_size,
        },
        supported_formats: SUPPORTED_VIDEO_FORMATS.iter().map(|f| f.to_string()).collect(),
        confidence_threshold: defaults.confidence_threshold,
        frame_interval_seconds: defaults.frame_interval_seconds,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
}

/// Liveness probe.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_string(),
    })
}
