//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use vscan_models::ErrorKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while ingesting or decoding a source.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Source is {size} bytes, limit is {limit} bytes")]
    SourceTooLarge { size: u64, limit: u64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Public error kind recorded on the job.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::DownloadFailed { .. } | MediaError::Timeout(_) => {
                ErrorKind::SourceUnreachable
            }
            MediaError::SourceTooLarge { .. } => ErrorKind::SourceTooLarge,
            MediaError::InvalidUrl(_) | MediaError::UnsupportedFormat(_) => {
                ErrorKind::InvalidConfig
            }
            MediaError::InvalidFrameRate(_) => ErrorKind::InvalidFrameRate,
            MediaError::FfmpegFailed { .. }
            | MediaError::FfprobeFailed { .. }
            | MediaError::FileNotFound(_)
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::InvalidVideo(_) => ErrorKind::SourceUnreadable,
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound | MediaError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}
