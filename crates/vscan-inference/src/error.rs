//! Error types for inference backends.

use thiserror::Error;
use vscan_models::ErrorKind;

/// Result type for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference backend is not ready")]
    NotReady,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend returned {got} scores for {expected} frames")]
    OutputMismatch { expected: usize, got: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InferenceError {
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InferenceError::NotReady
            | InferenceError::ModelNotFound(_)
            | InferenceError::ModelLoad(_) => ErrorKind::BackendNotReady,
            InferenceError::InvalidInput(_)
            | InferenceError::OutputMismatch { .. }
            | InferenceError::Inference(_) => ErrorKind::InferenceFailed,
            InferenceError::Internal(_) => ErrorKind::Internal,
        }
    }
}
