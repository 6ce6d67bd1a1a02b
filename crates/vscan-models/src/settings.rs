//! Per-job analysis settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default confidence threshold for a violent frame.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Default spacing between sampled frames, in seconds.
pub const DEFAULT_FRAME_INTERVAL_SECS: u32 = 1;

/// Upload extensions accepted for analysis.
pub const SUPPORTED_VIDEO_FORMATS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".webm"];

/// Settings captured when a job is created. Immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSettings {
    /// Minimum score for a frame to count as violent
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Seconds between sampled frames
    #[serde(default = "default_frame_interval")]
    pub frame_interval_seconds: u32,
    /// Upper bound on sampled frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frames: Option<u64>,
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_frame_interval() -> u32 {
    DEFAULT_FRAME_INTERVAL_SECS
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            frame_interval_seconds: DEFAULT_FRAME_INTERVAL_SECS,
            max_frames: None,
        }
    }
}

impl AnalysisSettings {
    pub fn new(confidence_threshold: f64, frame_interval_seconds: u32) -> Self {
        Self {
            confidence_threshold,
            frame_interval_seconds,
            max_frames: None,
        }
    }

    /// Set the sampled frame cap.
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SettingsError::ThresholdOutOfRange(self.confidence_threshold));
        }

        if self.frame_interval_seconds < 1 {
            return Err(SettingsError::IntervalTooShort(self.frame_interval_seconds));
        }

        if self.max_frames == Some(0) {
            return Err(SettingsError::ZeroMaxFrames);
        }

        Ok(())
    }
}

/// Check an upload filename against the supported container formats.
pub fn is_supported_format(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    SUPPORTED_VIDEO_FORMATS.iter().any(|ext| lower.ends_with(ext))
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("Confidence threshold must be between 0 and 1, got {0}")]
    ThresholdOutOfRange(f64),

    #[error("Frame extraction interval must be at least 1 second, got {0}")]
    IntervalTooShort(u32),

    #[error("Max frames must be positive when set")]
    ZeroMaxFrames,
}
