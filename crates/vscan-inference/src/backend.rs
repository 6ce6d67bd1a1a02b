//! The scoring capability shared by every backend.

use async_trait::async_trait;
use vscan_media::Frame;

use crate::error::{InferenceError, InferenceResult};

/// Scores frames with a violence probability in `[0, 1]`.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Whether the backend can accept requests.
    fn is_ready(&self) -> bool;

    /// Whether dropping an in-flight `predict_batch` future aborts the work.
    ///
    /// Backends that hand work to a blocking thread return false: the call
    /// keeps running to completion even if the caller stops awaiting it.
    fn supports_cancellation(&self) -> bool {
        false
    }

    /// Score a batch. The result has the same length and order as `frames`.
    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>>;

    /// Score a single frame.
    async fn predict(&self, frame: Frame) -> InferenceResult<f64> {
        let scores = self.predict_batch(vec![frame]).await?;
        scores
            .into_iter()
            .next()
            .ok_or(InferenceError::OutputMismatch { expected: 1, got: 0 })
    }
}

/// Clamp a raw model output into a probability.
pub(crate) fn to_probability(raw: f32) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        (raw as f64).clamp(0.0, 1.0)
    }
}
