//! Shared data models for the video violence scanner.
//!
//! This crate provides Serde-serializable types for:
//! - Analysis jobs, their lifecycle status and summaries
//! - Per-frame detections and bounding boxes
//! - Per-job analysis settings and their validation
//! - The public error taxonomy recorded on failed jobs

pub mod detection;
pub mod error;
pub mod job;
pub mod settings;

// Re-export common types
pub use detection::{BoundingBox, Detection};
pub use error::{ErrorKind, JobError};
pub use job::{Job, JobId, JobPage, JobStatus, JobSummary, ParseJobStatusError, SourceInfo};
pub use settings::{AnalysisSettings, SettingsError, SUPPORTED_VIDEO_FORMATS};
