//! Interval-based frame sampling.
//!
//! Given a source at `fps` and an interval of `n` seconds, every
//! `step = round(fps * n)` source frame is emitted (step is at least 1),
//! starting from frame 0. Frames in between are skipped without allocation.

use tracing::trace;

use crate::decode::{DecodedSource, FrameSource, StreamInfo};
use crate::error::{MediaError, MediaResult};

/// A sampled frame handed to inference.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Packed RGB24 pixels
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `frame_number / fps`
    pub timestamp_seconds: f64,
    /// Index in the source, not the sampled index
    pub frame_number: u64,
}

/// Lazily samples frames from a decoded source.
///
/// Single pass: once exhausted or dropped, the source is released and a new
/// sampler needs a freshly opened source.
pub struct FrameSampler {
    source: Option<Box<dyn FrameSource>>,
    info: StreamInfo,
    step: u64,
    max_frames: Option<u64>,
    emitted: u64,
    /// Index of the next frame the source will yield
    position: u64,
}

impl FrameSampler {
    pub fn new(
        decoded: DecodedSource,
        interval_seconds: u32,
        max_frames: Option<u64>,
    ) -> MediaResult<Self> {
        let info = decoded.info;
        if !(info.fps > 0.0) {
            return Err(MediaError::InvalidFrameRate(info.fps));
        }

        Ok(Self {
            source: Some(decoded.frames),
            info,
            step: sample_step(info.fps, interval_seconds),
            max_frames,
            emitted: 0,
            position: 0,
        })
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Number of frames this sampler will emit, if the source length is known.
    pub fn expected_frames(&self) -> Option<u64> {
        self.info
            .total_frames
            .map(|total| expected_samples(total, self.step, self.max_frames))
    }

    /// Whether the source has been released.
    pub fn is_exhausted(&self) -> bool {
        self.source.is_none()
    }

    /// Next sampled frame, or `None` when the source or the frame cap is exhausted.
    ///
    /// The source is released on exhaustion and on error.
    pub async fn next(&mut self) -> MediaResult<Option<Frame>> {
        match self.advance().await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                self.release();
                Ok(None)
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    async fn advance(&mut self) -> MediaResult<Option<Frame>> {
        if self.max_frames.is_some_and(|max| self.emitted >= max) {
            return Ok(None);
        }

        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        let target = self.emitted * self.step;
        let gap = target - self.position;
        if gap > 0 {
            let skipped = source.skip_frames(gap).await?;
            self.position += skipped;
            if skipped < gap {
                return Ok(None);
            }
        }

        let Some(raw) = source.next_frame().await? else {
            return Ok(None);
        };

        self.position += 1;
        self.emitted += 1;

        trace!(frame_number = target, "Sampled frame");

        Ok(Some(Frame {
            data: raw.data,
            width: raw.width,
            height: raw.height,
            timestamp_seconds: target as f64 / self.info.fps,
            frame_number: target,
        }))
    }

    /// Drop the underlying source early.
    pub fn release(&mut self) {
        self.source = None;
    }
}

/// Source frames between samples, at least 1.
pub fn sample_step(fps: f64, interval_seconds: u32) -> u64 {
    let step = (fps * interval_seconds as f64).round();
    if step < 1.0 {
        1
    } else {
        step as u64
    }
}

/// Sampled frames produced from `total` source frames.
pub fn expected_samples(total: u64, step: u64, max_frames: Option<u64>) -> u64 {
    let step = step.max(1);
    let samples = total.div_ceil(step);
    match max_frames {
        Some(max) => samples.min(max),
        None => samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RawFrame;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Synthetic {
        total: u64,
        next: u64,
        dropped: Arc<AtomicBool>,
    }

    impl Drop for Synthetic {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FrameSource for Synthetic {
        async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
            if self.next >= self.total {
                return Ok(None);
            }
            let value = (self.next % 256) as u8;
            self.next += 1;
            Ok(Some(RawFrame {
                width: 1,
                height: 1,
                data: vec![value; 3],
            }))
        }
    }

    fn decoded(fps: f64, total: u64, dropped: Arc<AtomicBool>) -> DecodedSource {
        DecodedSource {
            info: StreamInfo {
                fps,
                total_frames: Some(total),
                width: 1,
                height: 1,
            },
            frames: Box::new(Synthetic {
                total,
                next: 0,
                dropped,
            }),
        }
    }

    async fn collect(sampler: &mut FrameSampler) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = sampler.next().await.unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_one_second_interval_at_30fps() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut sampler = FrameSampler::new(decoded(30.0, 300, dropped.clone()), 1, None).unwrap();
        assert_eq!(sampler.expected_frames(), Some(10));

        let frames = collect(&mut sampler).await;
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, (0..10).map(|i| i * 30).collect::<Vec<_>>());

        for frame in &frames {
            assert!((frame.timestamp_seconds - frame.frame_number as f64 / 30.0).abs() < 1e-9);
            assert_eq!(frame.data[0], (frame.frame_number % 256) as u8);
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_max_frames_releases_source_early() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut sampler =
            FrameSampler::new(decoded(30.0, 300, dropped.clone()), 2, Some(3)).unwrap();
        assert_eq!(sampler.expected_frames(), Some(3));

        let frames = collect(&mut sampler).await;
        assert_eq!(
            frames.iter().map(|f| f.frame_number).collect::<Vec<_>>(),
            vec![0, 60, 120]
        );
        assert!(dropped.load(Ordering::SeqCst));
        assert!(sampler.is_exhausted());
    }

    #[tokio::test]
    async fn test_drop_mid_iteration_releases_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut sampler = FrameSampler::new(decoded(30.0, 300, dropped.clone()), 1, None).unwrap();
        sampler.next().await.unwrap();
        assert!(!dropped.load(Ordering::SeqCst));

        drop(sampler);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_low_fps_clamps_step() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut sampler = FrameSampler::new(decoded(0.4, 3, dropped), 1, None).unwrap();
        assert_eq!(sampler.step(), 1);
        assert_eq!(collect(&mut sampler).await.len(), 3);
    }

    #[test]
    fn test_zero_fps_rejected() {
        let dropped = Arc::new(AtomicBool::new(false));
        let result = FrameSampler::new(decoded(0.0, 10, dropped), 1, None);
        assert!(matches!(result, Err(MediaError::InvalidFrameRate(_))));
    }

    #[test]
    fn test_step_rounding() {
        assert_eq!(sample_step(29.97, 1), 30);
        assert_eq!(sample_step(23.976, 2), 48);
        assert_eq!(sample_step(30.0, 1), 30);
    }

    #[test]
    fn test_expected_samples() {
        assert_eq!(expected_samples(300, 30, None), 10);
        assert_eq!(expected_samples(301, 30, None), 11);
        assert_eq!(expected_samples(0, 30, None), 0);
        assert_eq!(expected_samples(300, 30, Some(4)), 4);
    }
}
