//! Batching sampled frames and scoring them in order.
//!
//! Decoding and inference overlap: a producer task pulls frames from the
//! sampler and sends full batches through a bounded channel while the job
//! task scores the previous batch. The channel capacity bounds how far the
//! decoder may run ahead.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};
use vscan_inference::{InferenceBackend, InferenceError};
use vscan_media::{Frame, FrameSampler, MediaResult};

use crate::aggregator::ScoredFrame;
use crate::error::PipelineResult;
use crate::metrics;

/// A group of consecutive sampled frames.
#[derive(Debug)]
pub struct FrameBatch {
    /// Zero-based position of the batch in the job
    pub index: usize,
    pub frames: Vec<Frame>,
}

/// Receiving side of the producer channel.
pub type BatchReceiver = mpsc::Receiver<MediaResult<FrameBatch>>;

/// Spawn a task that drains `sampler` into batches of `batch_size`.
///
/// The task ends, releasing the sampler, when the source is exhausted, on the
/// first decode error (which is forwarded), or when the receiver is dropped.
pub fn spawn_producer(
    mut sampler: FrameSampler,
    batch_size: usize,
    depth: usize,
) -> (BatchReceiver, JoinHandle<()>) {
    let batch_size = batch_size.max(1);
    let (tx, rx) = mpsc::channel(depth.max(1));

    let task = tokio::spawn(
        async move {
            let mut index = 0;
            let mut frames = Vec::with_capacity(batch_size);

            loop {
                match sampler.next().await {
                    Ok(Some(frame)) => {
                        frames.push(frame);
                        if frames.len() < batch_size {
                            continue;
                        }
                        let batch = FrameBatch {
                            index,
                            frames: std::mem::replace(&mut frames, Vec::with_capacity(batch_size)),
                        };
                        index += 1;
                        if tx.send(Ok(batch)).await.is_err() {
                            debug!("Batch receiver dropped, stopping decode");
                            break;
                        }
                    }
                    Ok(None) => {
                        if !frames.is_empty() {
                            let batch = FrameBatch {
                                index,
                                frames: std::mem::take(&mut frames),
                            };
                            let _ = tx.send(Ok(batch)).await;
                        }
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }

            sampler.release();
        }
        .in_current_span(),
    );

    (rx, task)
}

/// Sends batches to the backend and pairs scores with their frames.
#[derive(Clone)]
pub struct BatchDispatcher {
    backend: Arc<dyn InferenceBackend>,
}

impl BatchDispatcher {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Score one batch. Scores keep the order of `batch.frames`.
    pub async fn score(&self, batch: FrameBatch) -> PipelineResult<Vec<ScoredFrame>> {
        let positions: Vec<(u64, f64)> = batch
            .frames
            .iter()
            .map(|f| (f.frame_number, f.timestamp_seconds))
            .collect();
        let count = positions.len();

        let started = Instant::now();
        let scores = self.backend.predict_batch(batch.frames).await?;
        let elapsed = started.elapsed().as_secs_f64();

        if scores.len() != count {
            return Err(InferenceError::OutputMismatch {
                expected: count,
                got: scores.len(),
            }
            .into());
        }

        metrics::record_batch_inference(self.backend.name(), count, elapsed);
        debug!(batch = batch.index, frames = count, elapsed_secs = elapsed, "Scored batch");

        Ok(positions
            .into_iter()
            .zip(scores)
            .map(|((frame_number, timestamp_seconds), score)| ScoredFrame {
                frame_number,
                timestamp_seconds,
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscan_inference::{InferenceResult, MockBackend};
    use vscan_media::{DecodedSource, FrameSource, RawFrame, StreamInfo};

    struct Counter {
        total: u64,
        next: u64,
    }

    #[async_trait::async_trait]
    impl FrameSource for Counter {
        async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
            if self.next >= self.total {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(RawFrame {
                width: 1,
                height: 1,
                data: vec![self.next as u8; 3],
            }))
        }
    }

    fn sampler(total: u64) -> FrameSampler {
        let decoded = DecodedSource {
            info: StreamInfo {
                fps: 1.0,
                total_frames: Some(total),
                width: 1,
                height: 1,
            },
            frames: Box::new(Counter { total, next: 0 }),
        };
        FrameSampler::new(decoded, 1, None).unwrap()
    }

    #[tokio::test]
    async fn test_producer_emits_final_partial_batch() {
        let (mut rx, task) = spawn_producer(sampler(7), 3, 2);

        let mut sizes = Vec::new();
        let mut indices = Vec::new();
        while let Some(batch) = rx.recv().await {
            let batch = batch.unwrap();
            sizes.push(batch.frames.len());
            indices.push(batch.index);
        }
        task.await.unwrap();

        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_producer_stops_when_receiver_dropped() {
        let (mut rx, task) = spawn_producer(sampler(1000), 1, 1);
        rx.recv().await.unwrap().unwrap();
        drop(rx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_score_preserves_order() {
        let dispatcher = BatchDispatcher::new(Arc::new(MockBackend::new()));
        let frames: Vec<Frame> = (0..5u64)
            .map(|i| Frame {
                data: vec![i as u8; 3],
                width: 1,
                height: 1,
                timestamp_seconds: i as f64,
                frame_number: i * 30,
            })
            .collect();
        let expected: Vec<f64> = frames
            .iter()
            .map(|f| MockBackend::score_bytes(&f.data))
            .collect();

        let scored = dispatcher
            .score(FrameBatch { index: 0, frames })
            .await
            .unwrap();

        assert_eq!(
            scored.iter().map(|s| s.frame_number).collect::<Vec<_>>(),
            vec![0, 30, 60, 90, 120]
        );
        assert_eq!(scored.iter().map(|s| s.score).collect::<Vec<_>>(), expected);
    }

    struct ShortBackend;

    #[async_trait::async_trait]
    impl InferenceBackend for ShortBackend {
        fn name(&self) -> &'static str {
            "short"
        }

        fn is_ready(&self) -> bool {
            true
        }

        async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
            Ok(vec![0.5; frames.len().saturating_sub(1)])
        }
    }

    #[tokio::test]
    async fn test_score_rejects_length_mismatch() {
        let dispatcher = BatchDispatcher::new(Arc::new(ShortBackend));
        let frames = vec![
            Frame {
                data: vec![0; 3],
                width: 1,
                height: 1,
                timestamp_seconds: 0.0,
                frame_number: 0,
            };
            2
        ];

        let err = dispatcher
            .score(FrameBatch { index: 0, frames })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), vscan_models::ErrorKind::InferenceFailed);
    }
}
