//! Pipeline error types.

use thiserror::Error;
use vscan_inference::InferenceError;
use vscan_media::MediaError;
use vscan_models::{ErrorKind, SettingsError};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid analysis request: {0}")]
    InvalidRequest(String),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Scheduler is shut down")]
    ShutDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Public error kind recorded on the job or returned to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidRequest(_)
            | PipelineError::Settings(_)
            | PipelineError::ConfigError(_) => ErrorKind::InvalidConfig,
            PipelineError::Media(e) => e.kind(),
            PipelineError::Inference(e) => e.kind(),
            PipelineError::ShutDown | PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }
}
