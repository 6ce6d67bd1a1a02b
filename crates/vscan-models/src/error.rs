//! Error taxonomy exposed to API callers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of failure, stable across crate boundaries and serialized on jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad threshold, interval or source at submission time
    InvalidConfig,
    /// Remote source could not be fetched
    SourceUnreachable,
    /// Source exceeds the configured size limit
    SourceTooLarge,
    /// Source could not be opened or decoded
    SourceUnreadable,
    /// Source reports a non-positive frame rate
    InvalidFrameRate,
    /// Inference backend has not finished loading
    BackendNotReady,
    /// Inference backend returned an error for a batch
    InferenceFailed,
    /// No job with the given id
    JobNotFound,
    /// Anything else
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::SourceUnreachable => "source_unreachable",
            ErrorKind::SourceTooLarge => "source_too_large",
            ErrorKind::SourceUnreadable => "source_unreadable",
            ErrorKind::InvalidFrameRate => "invalid_frame_rate",
            ErrorKind::BackendNotReady => "backend_not_ready",
            ErrorKind::InferenceFailed => "inference_failed",
            ErrorKind::JobNotFound => "job_not_found",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::BackendNotReady | ErrorKind::SourceUnreachable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error recorded on a job that ended in the failed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BackendNotReady).unwrap();
        assert_eq!(json, "\"backend_not_ready\"");
    }

    #[test]
    fn test_backend_not_ready_is_retryable() {
        assert!(ErrorKind::BackendNotReady.is_retryable());
        assert!(!ErrorKind::SourceUnreadable.is_retryable());
        assert!(!ErrorKind::InferenceFailed.is_retryable());
    }
}
