//! Deterministic backend for development and tests.
//!
//! Each frame is hashed with SHA-256 and the hash is folded into one of three
//! bands: about 5% of frames score in `[0.80, 1.00)`, 10% in `[0.50, 0.80)` and
//! the rest in `[0.00, 0.40)`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use vscan_media::Frame;

use crate::backend::InferenceBackend;
use crate::error::InferenceResult;

#[derive(Debug, Clone, Default)]
pub struct MockBackend;

impl MockBackend {
    pub fn new() -> Self {
        Self
    }

    /// Score raw pixel bytes.
    pub fn score_bytes(data: &[u8]) -> f64 {
        let digest = Sha256::digest(data);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let bucket = u64::from_be_bytes(prefix) % 1000;

        if bucket < 50 {
            0.80 + (bucket % 20) as f64 / 100.0
        } else if bucket < 150 {
            0.50 + (bucket % 30) as f64 / 100.0
        } else {
            (bucket % 40) as f64 / 100.0
        }
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn supports_cancellation(&self) -> bool {
        true
    }

    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
        Ok(frames.iter().map(|f| Self::score_bytes(&f.data)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seed: u32) -> Frame {
        Frame {
            data: seed.to_le_bytes().repeat(12),
            width: 2,
            height: 2,
            timestamp_seconds: 0.0,
            frame_number: seed as u64,
        }
    }

    #[tokio::test]
    async fn test_scores_are_deterministic() {
        let backend = MockBackend::new();
        let first = backend.predict(frame(42)).await.unwrap();
        let second = backend.predict(frame(42)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let backend = MockBackend::new();
        let frames: Vec<Frame> = (0..8).map(frame).collect();
        let expected: Vec<f64> = frames.iter().map(|f| MockBackend::score_bytes(&f.data)).collect();

        let scores = backend.predict_batch(frames).await.unwrap();
        assert_eq!(scores, expected);
    }

    #[test]
    fn test_band_distribution() {
        let mut high = 0;
        let mut medium = 0;
        let mut low = 0;

        for seed in 0..10_000u32 {
            let score = MockBackend::score_bytes(&seed.to_le_bytes());
            assert!((0.0..1.0).contains(&score));
            if score >= 0.8 {
                high += 1;
            } else if score >= 0.5 {
                medium += 1;
            } else {
                assert!(score < 0.4);
                low += 1;
            }
        }

        // roughly 5% / 10% / 85%
        assert!((300..700).contains(&high), "high = {}", high);
        assert!((700..1300).contains(&medium), "medium = {}", medium);
        assert!(low > 8000, "low = {}", low);
    }
}
