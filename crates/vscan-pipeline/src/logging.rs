//! Structured job logging.
//!
//! Every lifecycle event of an analysis goes through a [`JobLogger`], so log
//! lines for one job always carry the same `job_id` and `operation` fields.

use tracing::{error, info, warn, Span};
use vscan_models::{AnalysisSettings, ErrorKind, Job, JobId};

/// Operation name attached to analysis job logs.
pub const ANALYSIS_OPERATION: &str = "violence_analysis";

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            operation,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Span wrapping everything the job's tasks log.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }

    pub fn queued(&self, source: &str, settings: &AnalysisSettings) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            source,
            threshold = settings.confidence_threshold,
            interval = settings.frame_interval_seconds,
            max_frames = ?settings.max_frames,
            "Analysis queued"
        );
    }

    pub fn admitted(&self, source: &str) {
        info!(job_id = %self.job_id, operation = self.operation, source, "Analysis admitted");
    }

    pub fn progress(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Analysis progress: {}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = self.operation, "Analysis warning: {}", message);
    }

    /// `before_start` is true when the stop landed while the job was still pending.
    pub fn stopped(&self, before_start: bool) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            before_start,
            "Analysis stopped on request"
        );
    }

    pub fn failed(&self, kind: ErrorKind, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            kind = kind.as_str(),
            "Analysis failed: {}", message
        );
    }

    pub fn completed(&self, job: &Job) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            processed_frames = job.processed_frames,
            violent_frames = job.violent_frame_count,
            duration_secs = job.duration_seconds().unwrap_or_default(),
            "Analysis completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_keeps_job_id() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, ANALYSIS_OPERATION);
        assert_eq!(logger.job_id(), &job_id);
    }
}
