//! Analysis service facade.
//!
//! The only entry point callers use: `start`, `status`, `stop`, `list` and
//! `delete`. Request validation happens synchronously in `start`; everything
//! that can fail later is recorded on the job and observed through `status`.

use std::sync::Arc;
use tracing::info;
use vscan_inference::InferenceBackend;
use vscan_media::{validate_upload, validate_url, SourceDecoder, SourceFetcher, VideoSource};
use vscan_models::{AnalysisSettings, Job, JobId, JobPage, JobStatus, SourceInfo};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::{JobLogger, ANALYSIS_OPERATION};
use crate::registry::JobRegistry;
use crate::scheduler::{JobScheduler, PipelineContext, QueuedJob};

pub struct AnalysisService {
    config: Arc<PipelineConfig>,
    registry: Arc<JobRegistry>,
    backend: Arc<dyn InferenceBackend>,
    scheduler: JobScheduler,
}

impl AnalysisService {
    /// Build the service and start its scheduler. Must be called within a Tokio runtime.
    pub fn new(
        config: Arc<PipelineConfig>,
        backend: Arc<dyn InferenceBackend>,
        fetcher: Arc<dyn SourceFetcher>,
        decoder: Arc<dyn SourceDecoder>,
    ) -> Self {
        let scheduler = JobScheduler::start(PipelineContext {
            config: Arc::clone(&config),
            backend: Arc::clone(&backend),
            fetcher,
            decoder,
        });

        Self {
            config,
            registry: Arc::new(JobRegistry::new()),
            backend,
            scheduler,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Settings used for fields a request leaves out.
    pub fn default_settings(&self) -> AnalysisSettings {
        self.config.default_settings()
    }

    /// Create a pending job and queue it for admission.
    ///
    /// Invalid settings, malformed URLs, unsupported upload formats and
    /// oversized uploads are rejected here without creating a job.
    pub fn start(&self, source: VideoSource, settings: AnalysisSettings) -> PipelineResult<JobId> {
        if !self.is_accepting() {
            return Err(PipelineError::ShutDown);
        }
        settings.validate()?;

        let source_info = match &source {
            VideoSource::Url(url) => {
                if url.trim().is_empty() {
                    return Err(PipelineError::invalid_request(
                        "Either a video URL or an uploaded file is required",
                    ));
                }
                validate_url(url)?;
                SourceInfo::Url { url: url.clone() }
            }
            VideoSource::Upload { filename, data } => {
                if data.is_empty() {
                    return Err(PipelineError::invalid_request("Uploaded file is empty"));
                }
                validate_upload(filename, data.len() as u64, self.config.max_video_size_bytes)?;
                SourceInfo::Upload {
                    filename: filename.clone(),
                    size_bytes: data.len() as u64,
                }
            }
        };

        let settings = AnalysisSettings {
            max_frames: settings.max_frames.or(self.config.max_frames_per_job),
            ..settings
        };

        let job = Job::new(source_info, &settings);
        let id = job.id.clone();
        let entry = self.registry.insert(job);
        let logger = JobLogger::new(&id, ANALYSIS_OPERATION);
        let label = format!("{:?}", source);

        if let Err(e) = self.scheduler.submit(QueuedJob {
            entry,
            source,
            logger: logger.clone(),
        }) {
            self.registry.remove(&id);
            return Err(e);
        }

        logger.queued(&label, &settings);
        Ok(id)
    }

    /// Snapshot of a job. Never waits on the pipeline.
    pub fn status(&self, id: &JobId) -> Option<Job> {
        self.registry.get(id).map(|entry| entry.snapshot())
    }

    /// Request a stop. False only for unknown ids; repeated calls are no-ops.
    pub fn stop(&self, id: &JobId) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return false;
        };

        if entry.request_stop() {
            info!(job_id = %id, status = %entry.status(), "Stop requested");
        }
        true
    }

    /// Page of job summaries in creation order.
    pub fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> JobPage {
        self.registry.list(status, limit, offset)
    }

    /// Remove a job, stopping it first if it is still active.
    pub fn delete(&self, id: &JobId) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return false;
        };

        let status = entry.status();
        if status.is_active() {
            entry.request_stop();
        }
        let removed = self.registry.remove(id).is_some();
        if removed {
            info!(job_id = %id, status = %status, "Analysis deleted");
        }
        removed
    }

    /// Jobs currently holding a concurrency slot.
    pub fn active_slots(&self) -> usize {
        self.config.max_concurrent_analyses - self.scheduler.available_slots()
    }

    /// Stop admitting new jobs.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    pub fn is_accepting(&self) -> bool {
        !self.scheduler.is_shut_down()
    }
}
