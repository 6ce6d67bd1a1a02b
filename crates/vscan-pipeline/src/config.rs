//! Pipeline configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vscan_models::settings::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FRAME_INTERVAL_SECS};
use vscan_models::AnalysisSettings;

use crate::error::{PipelineError, PipelineResult};

/// What happens to an in-flight inference call when its job is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Abandon if the backend supports cancellation, otherwise await
    #[default]
    Auto,
    /// Always wait for the call and discard its result
    Await,
    /// Always drop the call
    Abandon,
}

impl StopPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopPolicy::Auto => "auto",
            StopPolicy::Await => "await",
            StopPolicy::Abandon => "abandon",
        }
    }

    /// Whether to drop an in-flight call given the backend capability.
    pub fn abandons(&self, backend_supports_cancellation: bool) -> bool {
        match self {
            StopPolicy::Auto => backend_supports_cancellation,
            StopPolicy::Await => false,
            StopPolicy::Abandon => true,
        }
    }
}

impl fmt::Display for StopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StopPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(StopPolicy::Auto),
            "await" => Ok(StopPolicy::Await),
            "abandon" => Ok(StopPolicy::Abandon),
            other => Err(format!("unknown stop policy '{}'", other)),
        }
    }
}

/// Pipeline configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Jobs allowed in the running state at once
    pub max_concurrent_analyses: usize,
    /// Frames per inference call
    pub batch_size: usize,
    /// Largest accepted source
    pub max_video_size_bytes: u64,
    /// Directory for fetched sources
    pub temp_dir: PathBuf,
    /// Threshold used when a request omits one
    pub default_confidence_threshold: f64,
    /// Interval used when a request omits one
    pub default_frame_interval: u32,
    /// Cap on sampled frames per job
    pub max_frames_per_job: Option<u64>,
    /// Decoded batches buffered ahead of inference
    pub pipeline_depth: usize,
    pub stop_policy: StopPolicy,
    /// Temp files older than this are swept
    pub temp_max_age: Duration,
    pub temp_sweep_interval: Duration,
    /// Timeout for URL downloads
    pub fetch_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses: 5,
            batch_size: 32,
            max_video_size_bytes: 500 * 1024 * 1024,
            temp_dir: PathBuf::from("./temp"),
            default_confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            default_frame_interval: DEFAULT_FRAME_INTERVAL_SECS,
            max_frames_per_job: None,
            pipeline_depth: 2,
            stop_policy: StopPolicy::Auto,
            temp_max_age: Duration::from_secs(24 * 3600),
            temp_sweep_interval: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(300),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_concurrent_analyses: std::env::var("MAX_CONCURRENT_ANALYSES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_analyses),
            batch_size: std::env::var("BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            max_video_size_bytes: std::env::var("MAX_VIDEO_SIZE_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_video_size_bytes),
            temp_dir: std::env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            default_confidence_threshold: std::env::var("CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_confidence_threshold),
            default_frame_interval: std::env::var("FRAME_EXTRACTION_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_frame_interval),
            max_frames_per_job: std::env::var("MAX_FRAMES_PER_JOB")
                .ok()
                .and_then(|s| s.parse().ok()),
            pipeline_depth: std::env::var("PIPELINE_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pipeline_depth),
            stop_policy: std::env::var("STOP_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stop_policy),
            temp_max_age: std::env::var("TEMP_MAX_AGE_HOURS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|hours| Duration::from_secs(hours * 3600))
                .unwrap_or(defaults.temp_max_age),
            temp_sweep_interval: Duration::from_secs(
                std::env::var("TEMP_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            fetch_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.max_concurrent_analyses == 0 {
            return Err(PipelineError::config_error(
                "MAX_CONCURRENT_ANALYSES must be at least 1",
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::config_error("BATCH_SIZE must be at least 1"));
        }
        if self.pipeline_depth == 0 {
            return Err(PipelineError::config_error("PIPELINE_DEPTH must be at least 1"));
        }
        if self.max_video_size_bytes == 0 {
            return Err(PipelineError::config_error("MAX_VIDEO_SIZE_MB must be positive"));
        }
        if self.temp_sweep_interval.is_zero() {
            return Err(PipelineError::config_error(
                "TEMP_SWEEP_INTERVAL_SECS must be positive",
            ));
        }
        self.default_settings().validate()?;
        Ok(())
    }

    /// Per-job settings used when a request leaves them out.
    pub fn default_settings(&self) -> AnalysisSettings {
        AnalysisSettings::new(self.default_confidence_threshold, self.default_frame_interval)
            .with_max_frames(self.max_frames_per_job)
    }

    pub fn max_video_size_mb(&self) -> u64 {
        self.max_video_size_bytes / (1024 * 1024)
    }
}
