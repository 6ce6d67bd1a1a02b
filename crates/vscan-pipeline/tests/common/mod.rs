//! Test doubles shared by the pipeline integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use vscan_inference::{InferenceBackend, InferenceError, InferenceResult};
use vscan_media::{
    DecodedSource, Frame, FrameSource, HttpFetcher, MediaError, MediaResult, RawFrame,
    SourceDecoder, StreamInfo, VideoSource,
};
use vscan_models::{Job, JobId};
use vscan_pipeline::{AnalysisService, PipelineConfig};

/// Decoder that ignores the file and yields numbered frames.
#[derive(Debug, Clone)]
pub struct SyntheticDecoder {
    pub fps: f64,
    pub total_frames: u64,
    pub report_total: bool,
    pub fail_open: bool,
    /// Source frame index at which the frame source panics
    pub panic_at: Option<u64>,
}

impl SyntheticDecoder {
    pub fn new(fps: f64, total_frames: u64) -> Self {
        Self {
            fps,
            total_frames,
            report_total: true,
            fail_open: false,
            panic_at: None,
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_open: true,
            ..Self::new(30.0, 0)
        }
    }
}

struct SyntheticFrames {
    next: u64,
    total: u64,
    panic_at: Option<u64>,
}

#[async_trait]
impl FrameSource for SyntheticFrames {
    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let index = self.next;
        if self.panic_at == Some(index) {
            panic!("synthetic decode crash at frame {}", index);
        }
        self.next += 1;
        Ok(Some(RawFrame {
            width: 1,
            height: 1,
            data: index.to_le_bytes().to_vec(),
        }))
    }
}

#[async_trait]
impl SourceDecoder for SyntheticDecoder {
    async fn open(&self, path: &Path) -> MediaResult<DecodedSource> {
        if self.fail_open {
            return Err(MediaError::InvalidVideo(format!("{} has no video stream", path.display())));
        }
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        Ok(DecodedSource {
            info: StreamInfo {
                fps: self.fps,
                total_frames: self.report_total.then_some(self.total_frames),
                width: 1,
                height: 1,
            },
            frames: Box::new(SyntheticFrames {
                next: 0,
                total: self.total_frames,
                panic_at: self.panic_at,
            }),
        })
    }
}

/// Scores every frame with the same value.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackend(pub f64);

#[async_trait]
impl InferenceBackend for ConstantBackend {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
        Ok(vec![self.0; frames.len()])
    }
}

/// Backend whose calls block until the test opens the gate, one call per permit.
pub struct GatedBackend {
    gate: Semaphore,
    score: f64,
    cancellable: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<u64>>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GatedBackend {
    pub fn new(score: f64, cancellable: bool) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            score,
            cancellable,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Let `calls` more batches through.
    pub fn open(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen_frames(&self) -> Vec<u64> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for GatedBackend {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn supports_cancellation(&self) -> bool {
        self.cancellable
    }

    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.gate
            .acquire()
            .await
            .map_err(|e| InferenceError::internal(e.to_string()))?
            .forget();

        self.seen
            .lock()
            .unwrap()
            .extend(frames.iter().map(|f| f.frame_number));
        Ok(vec![self.score; frames.len()])
    }
}

/// Succeeds with a fixed score until the `fail_on`-th call (zero based).
pub struct FailingBackend {
    fail_on: usize,
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new(fail_on: usize) -> Self {
        Self {
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_on {
            return Err(InferenceError::inference("model exploded"));
        }
        Ok(vec![0.9; frames.len()])
    }
}

/// A service wired to test doubles, with its own temp directory.
pub struct Harness {
    pub service: AnalysisService,
    pub temp: TempDir,
}

impl Harness {
    pub fn new(
        configure: impl FnOnce(&mut PipelineConfig),
        backend: Arc<dyn InferenceBackend>,
        decoder: SyntheticDecoder,
    ) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig {
            temp_dir: temp.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        configure(&mut config);

        let fetcher = HttpFetcher::new(temp.path(), config.max_video_size_bytes, 5).unwrap();
        let service = AnalysisService::new(
            Arc::new(config),
            backend,
            Arc::new(fetcher),
            Arc::new(decoder),
        );

        Self { service, temp }
    }

    /// Files the fetcher left in the temp directory.
    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(self.temp.path()).unwrap().count()
    }

    pub async fn wait_for(&self, id: &JobId, pred: impl Fn(&Job) -> bool) -> Job {
        wait_for(&self.service, id, pred).await
    }

    pub async fn wait_terminal(&self, id: &JobId) -> Job {
        wait_for(&self.service, id, |job| job.status.is_terminal()).await
    }
}

/// Poll until `pred` holds for the job, panicking after five seconds.
pub async fn wait_for(service: &AnalysisService, id: &JobId, pred: impl Fn(&Job) -> bool) -> Job {
    let poll = async {
        loop {
            let job = service.status(id).expect("job exists");
            if pred(&job) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("condition not reached in time")
}

pub fn upload() -> VideoSource {
    VideoSource::Upload {
        filename: "clip.mp4".to_string(),
        data: vec![0u8; 64],
    }
}
