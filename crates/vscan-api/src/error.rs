//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vscan_models::ErrorKind;
use vscan_pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Public error kind, when one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApiError::NotFound(_) => Some(ErrorKind::JobNotFound),
            ApiError::BadRequest(_) => Some(ErrorKind::InvalidConfig),
            ApiError::PayloadTooLarge(_) => Some(ErrorKind::SourceTooLarge),
            ApiError::Pipeline(PipelineError::ShutDown) => None,
            ApiError::Pipeline(e) => Some(e.kind()),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Pipeline(PipelineError::ShutDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pipeline(e) => status_for_kind(e.kind()),
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// HTTP status for a public error kind.
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidConfig => StatusCode::BAD_REQUEST,
        ErrorKind::JobNotFound => StatusCode::NOT_FOUND,
        ErrorKind::SourceTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::SourceUnreadable | ErrorKind::InvalidFrameRate => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::SourceUnreachable => StatusCode::BAD_GATEWAY,
        ErrorKind::BackendNotReady => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::InferenceFailed | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(e.body_text())
        } else {
            ApiError::BadRequest(e.body_text())
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorKind>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            detail,
            code: self.kind(),
        };

        (status, Json(body)).into_response()
    }
}
