//! Analysis job record and lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::{AnalysisSettings, Detection, ErrorKind, JobError};

/// Unique identifier for an analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an analysis job.
///
/// `Pending -> Running -> {Completed, Failed, Stopped}`, plus `Pending -> Stopped`
/// and `Pending -> Failed` for jobs that never got past admission or ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a concurrency slot
    #[default]
    Pending,
    /// Frames are being sampled and scored
    Running,
    /// All frames scored
    Completed,
    /// Unrecoverable error, see `Job::error`
    Failed,
    /// Stopped on request
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "stopped" => Ok(JobStatus::Stopped),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// Where the analyzed video came from. Never carries the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceInfo {
    Url { url: String },
    Upload { filename: String, size_bytes: u64 },
}

/// An analysis job and its evolving result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current lifecycle status
    pub status: JobStatus,

    /// Percent complete, 0..=100
    pub progress: u8,

    /// Number of frames that will be sampled, once the source is probed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,

    /// Sampled frames scored so far
    pub processed_frames: u64,

    /// Detections at or above `confidence_threshold`
    pub violent_frame_count: u64,

    /// Detections in frame order
    pub detections: Vec<Detection>,

    pub confidence_threshold: f64,

    pub frame_interval_seconds: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frames: Option<u64>,

    pub source: SourceInfo,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set exactly once, when the job enters a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Present only on failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(source: SourceInfo, settings: &AnalysisSettings) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            progress: 0,
            total_frames: None,
            processed_frames: 0,
            violent_frame_count: 0,
            detections: Vec::new(),
            confidence_threshold: settings.confidence_threshold,
            frame_interval_seconds: settings.frame_interval_seconds,
            max_frames: settings.max_frames,
            source,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Settings captured at creation.
    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings::new(self.confidence_threshold, self.frame_interval_seconds)
            .with_max_frames(self.max_frames)
    }

    /// Pending -> Running. Returns false if the job was not pending.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Running -> Completed. Returns false if the job was not running.
    pub fn complete(&mut self) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.finish();
        true
    }

    /// Any active status -> Failed. Returns false if already terminal.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(JobError::new(kind, message));
        self.finish();
        true
    }

    /// Any active status -> Stopped. Returns false if already terminal.
    pub fn stop(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Stopped;
        self.finish();
        true
    }

    fn finish(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Wall time spent running, if the job started.
    pub fn duration_seconds(&self) -> Option<f64> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }

    /// Read-only projection without the detection list.
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            total_frames: self.total_frames,
            processed_frames: self.processed_frames,
            violent_frame_count: self.violent_frame_count,
            confidence_threshold: self.confidence_threshold,
            frame_interval_seconds: self.frame_interval_seconds,
            source: self.source.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_kind: self.error.as_ref().map(|e| e.kind),
        }
    }
}

/// Listing entry for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    pub processed_frames: u64,
    pub violent_frame_count: u64,
    pub confidence_threshold: f64,
    pub frame_interval_seconds: u32,
    pub source: SourceInfo,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// One page of job summaries in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobPage {
    pub items: Vec<JobSummary>,
    /// Matching jobs before pagination
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
