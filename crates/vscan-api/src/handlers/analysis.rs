//! Analysis API handlers.
//!
//! Thin transport over [`AnalysisService`](vscan_pipeline::AnalysisService):
//! requests are parsed and validated here, everything else is the service's.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vscan_media::VideoSource;
use vscan_models::{AnalysisSettings, Job, JobId, JobStatus, JobSummary};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Page size when the request gives none.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Largest page a caller may request.
pub const MAX_LIST_LIMIT: usize = 100;

/// Multipart field carrying the video.
const VIDEO_FIELD: &str = "video_file";

// ============================================================================
// Request / response types
// ============================================================================

/// Request to analyze a video by URL.
#[derive(Debug, Deserialize)]
pub struct StartAnalysisRequest {
    pub video_url: String,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    /// Seconds between sampled frames
    #[serde(default)]
    pub frame_interval: Option<u32>,
}

/// Response to start, stop and delete.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisActionResponse {
    pub success: bool,
    pub analysis_id: String,
    pub message: String,
}

impl AnalysisActionResponse {
    fn ok(id: &JobId, message: impl Into<String>) -> Self {
        Self {
            success: true,
            analysis_id: id.to_string(),
            message: message.into(),
        }
    }
}

/// Full job snapshot.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub data: Job,
}

/// Query parameters for listing analyses.
#[derive(Debug, Default, Deserialize)]
pub struct ListAnalysesQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ListAnalysesResponse {
    pub success: bool,
    pub data: Vec<JobSummary>,
    pub pagination: Pagination,
}

/// Fill fields the request left out from the service defaults.
fn request_settings(
    state: &AppState,
    confidence_threshold: Option<f64>,
    frame_interval: Option<u32>,
) -> AnalysisSettings {
    let defaults = state.service.default_settings();
    AnalysisSettings {
        confidence_threshold: confidence_threshold.unwrap_or(defaults.confidence_threshold),
        frame_interval_seconds: frame_interval.unwrap_or(defaults.frame_interval_seconds),
        max_frames: None,
    }
}

// ============================================================================
// Start
// ============================================================================

/// Start analyzing a video by URL.
pub async fn start_analysis(
    State(state): State<AppState>,
    Json(request): Json<StartAnalysisRequest>,
) -> ApiResult<Json<AnalysisActionResponse>> {
    let settings = request_settings(&state, request.confidence_threshold, request.frame_interval);
    let id = state
        .service
        .start(VideoSource::Url(request.video_url.trim().to_string()), settings)?;

    metrics::record_analysis_submitted("url");
    info!(analysis_id = %id, "Started URL analysis");

    Ok(Json(AnalysisActionResponse::ok(&id, "Analysis started")))
}

/// Start analyzing an uploaded video.
pub async fn upload_analysis(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalysisActionResponse>> {
    let mut video: Option<(String, Vec<u8>)> = None;
    let mut confidence_threshold = None;
    let mut frame_interval = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            VIDEO_FIELD => {
                let filename = field.file_name().unwrap_or_default().to_string();
                // takes over the buffer when nothing else shares it
                let data: Vec<u8> = field.bytes().await?.into();
                video = Some((filename, data));
            }
            "confidence_threshold" => {
                let text = field.text().await?;
                confidence_threshold = Some(text.trim().parse::<f64>().map_err(|_| {
                    ApiError::bad_request(format!("Invalid confidence_threshold '{}'", text))
                })?);
            }
            "frame_interval" => {
                let text = field.text().await?;
                frame_interval = Some(text.trim().parse::<u32>().map_err(|_| {
                    ApiError::bad_request(format!("Invalid frame_interval '{}'", text))
                })?);
            }
            _ => {}
        }
    }

    let (filename, data) = video
        .ok_or_else(|| ApiError::bad_request(format!("Missing '{}' field", VIDEO_FIELD)))?;
    let size_bytes = data.len();

    let settings = request_settings(&state, confidence_threshold, frame_interval);
    let id = state
        .service
        .start(VideoSource::Upload { filename: filename.clone(), data }, settings)?;

    metrics::record_analysis_submitted("upload");
    info!(analysis_id = %id, filename = %filename, size_bytes, "Started upload analysis");

    Ok(Json(AnalysisActionResponse::ok(&id, "Analysis started")))
}

// ============================================================================
// Status / list
// ============================================================================

/// Current snapshot of one analysis.
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysisResponse>> {
    let id = JobId::from_string(id);
    let job = state
        .service
        .status(&id)
        .ok_or_else(|| ApiError::not_found(format!("Analysis {} not found", id)))?;

    Ok(Json(AnalysisResponse {
        success: true,
        data: job,
    }))
}

/// Page of analyses in creation order.
pub async fn list_analyses(
    State(state): State<AppState>,
    Query(query): Query<ListAnalysesQuery>,
) -> ApiResult<Json<ListAnalysesResponse>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let page = state.service.list(status, limit, offset);

    Ok(Json(ListAnalysesResponse {
        success: true,
        data: page.items,
        pagination: Pagination {
            limit: page.limit,
            offset: page.offset,
            total: page.total,
        },
    }))
}

// ============================================================================
// Stop / delete
// ============================================================================

/// Request a stop. Repeating it is harmless.
pub async fn stop_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysisActionResponse>> {
    let id = JobId::from_string(id);
    if !state.service.stop(&id) {
        return Err(ApiError::not_found(format!("Analysis {} not found", id)));
    }

    let message = match state.service.status(&id).map(|job| job.status) {
        Some(JobStatus::Running) => "Stop requested, analysis ends after the current batch".to_string(),
        Some(JobStatus::Stopped) | None => "Analysis stopped".to_string(),
        Some(status) => format!("Analysis already {}", status),
    };

    Ok(Json(AnalysisActionResponse::ok(&id, message)))
}

/// Delete an analysis, stopping it first if needed.
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysisActionResponse>> {
    let id = JobId::from_string(id);
    if !state.service.delete(&id) {
        return Err(ApiError::not_found(format!("Analysis {} not found", id)));
    }

    Ok(Json(AnalysisActionResponse::ok(&id, "Analysis deleted")))
}
