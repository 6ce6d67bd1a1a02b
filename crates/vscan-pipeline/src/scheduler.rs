//! Job admission and execution.
//!
//! Submitted jobs enter an admission queue in submission order. A single
//! admission task takes them one at a time, waits for a concurrency permit,
//! and spawns the job's pipeline with the permit attached. The permit is
//! released only after the job reaches a terminal state, so at most
//! `max_concurrent_analyses` jobs are ever running.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};
use vscan_inference::InferenceBackend;
use vscan_media::{FrameSampler, SourceDecoder, SourceFetcher, VideoSource};
use vscan_models::ErrorKind;

use crate::config::PipelineConfig;
use crate::dispatcher::{spawn_producer, BatchDispatcher};
use crate::error::PipelineError;
use crate::logging::JobLogger;
use crate::metrics;
use crate::registry::{FoldOutcome, JobEntry};

/// A job waiting for admission.
pub struct QueuedJob {
    pub entry: Arc<JobEntry>,
    pub source: VideoSource,
    pub logger: JobLogger,
}

/// Collaborators shared by every job task.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub backend: Arc<dyn InferenceBackend>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub decoder: Arc<dyn SourceDecoder>,
}

/// Owns the admission queue and the concurrency permits.
pub struct JobScheduler {
    queue: mpsc::UnboundedSender<QueuedJob>,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    admission: JoinHandle<()>,
}

impl JobScheduler {
    /// Start the admission task. Must be called within a Tokio runtime.
    pub fn start(ctx: PipelineContext) -> Self {
        let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_analyses));
        let (queue, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(
            max_concurrent = ctx.config.max_concurrent_analyses,
            batch_size = ctx.config.batch_size,
            stop_policy = %ctx.config.stop_policy,
            "Starting job scheduler"
        );

        let admission = tokio::spawn(run_admission(ctx, Arc::clone(&semaphore), rx, shutdown_rx));

        Self {
            queue,
            semaphore,
            shutdown,
            admission,
        }
    }

    /// Queue a pending job for admission.
    pub fn submit(&self, job: QueuedJob) -> Result<(), PipelineError> {
        self.queue.send(job).map_err(|_| PipelineError::ShutDown)
    }

    /// Free concurrency slots.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Stop admitting jobs. Running jobs continue to completion.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow() || self.admission.is_finished()
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.admission.abort();
    }
}

async fn run_admission(
    ctx: PipelineContext,
    semaphore: Arc<Semaphore>,
    mut rx: mpsc::UnboundedReceiver<QueuedJob>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let queued = tokio::select! {
            queued = rx.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        // stopped while queued
        if queued.entry.is_terminal() {
            continue;
        }

        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        if queued.entry.is_terminal() {
            continue;
        }

        let span = queued.logger.span();
        tokio::spawn(run_job(ctx.clone(), queued, permit).instrument(span));
    }

    debug!("Admission loop stopped");
}

/// Resolves once a stop has been requested for the job.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        // sender lives as long as the entry
        std::future::pending::<()>().await;
    }
}

/// How a job's pipeline ended.
enum Outcome {
    Completed,
    Stopped,
    Failed(ErrorKind, String),
}

impl From<PipelineError> for Outcome {
    fn from(e: PipelineError) -> Self {
        Outcome::Failed(e.kind(), e.to_string())
    }
}

async fn run_job(ctx: PipelineContext, queued: QueuedJob, permit: OwnedSemaphorePermit) {
    let _permit = permit;
    let QueuedJob {
        entry,
        source,
        logger,
    } = queued;

    logger.admitted(&format!("{:?}", source));

    let outcome = match execute(&ctx, &entry, &source, &logger).await {
        // an error racing a stop request still ends as a stop
        Outcome::Failed(..) if entry.stop_requested() => Outcome::Stopped,
        outcome => outcome,
    };
    let was_running = entry.update(|state| state.job.started_at.is_some());

    match outcome {
        Outcome::Completed => {
            if entry.complete() {
                metrics::record_job_completed();
                logger.completed(&entry.snapshot());
            }
        }
        Outcome::Stopped => {
            // pending jobs are already stopped by the request itself
            logger.stopped(!entry.mark_stopped());
        }
        Outcome::Failed(kind, message) => {
            if entry.fail(kind, message.clone()) {
                metrics::record_job_failed(kind);
                logger.failed(kind, &message);
            }
        }
    }

    if was_running {
        metrics::record_job_finished_running();
    }
}

async fn execute(
    ctx: &PipelineContext,
    entry: &Arc<JobEntry>,
    source: &VideoSource,
    logger: &JobLogger,
) -> Outcome {
    let mut cancel = entry.subscribe_cancel();

    if !ctx.backend.is_ready() {
        return Outcome::Failed(
            ErrorKind::BackendNotReady,
            format!("Inference backend '{}' is still loading", ctx.backend.name()),
        );
    }

    let handle = tokio::select! {
        result = ctx.fetcher.fetch(source) => match result {
            Ok(handle) => handle,
            Err(e) => return PipelineError::from(e).into(),
        },
        _ = cancelled(&mut cancel) => return Outcome::Stopped,
    };

    if !entry.start() {
        return Outcome::Stopped;
    }
    metrics::record_job_started();

    let decoded = tokio::select! {
        result = ctx.decoder.open(handle.path()) => match result {
            Ok(decoded) => decoded,
            Err(e) => return PipelineError::from(e).into(),
        },
        _ = cancelled(&mut cancel) => return Outcome::Stopped,
    };

    let settings = entry.update(|state| state.job.settings());
    let sampler = match FrameSampler::new(decoded, settings.frame_interval_seconds, settings.max_frames) {
        Ok(sampler) => sampler,
        Err(e) => return PipelineError::from(e).into(),
    };

    let total = sampler.expected_frames();
    entry.set_total_frames(total);
    match total {
        Some(total) => logger.progress(&format!(
            "decoding at {:.3} fps, step {}, {} frames to score",
            sampler.info().fps,
            sampler.step(),
            total
        )),
        None => logger.warning(&format!(
            "source frame count unknown, progress holds until completion (fps {:.3}, step {})",
            sampler.info().fps,
            sampler.step()
        )),
    }

    let (mut batches, mut producer) = spawn_producer(sampler, ctx.config.batch_size, ctx.config.pipeline_depth);
    let dispatcher = BatchDispatcher::new(Arc::clone(&ctx.backend));
    let abandon = ctx
        .config
        .stop_policy
        .abandons(ctx.backend.supports_cancellation());

    let outcome: Outcome = loop {
        // batch boundary
        if entry.stop_requested() {
            break Outcome::Stopped;
        }

        let next = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break Outcome::Stopped,
            next = batches.recv() => next,
        };

        let batch = match next {
            // closed channel: exhausted, or the decode task died
            None => match (&mut producer).await {
                Ok(()) => break Outcome::Completed,
                Err(e) => break PipelineError::internal(format!("Decode task ended abnormally: {}", e)).into(),
            },
            Some(Err(e)) => break PipelineError::from(e).into(),
            Some(Ok(batch)) => batch,
        };

        let scored = if abandon {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break Outcome::Stopped,
                scored = dispatcher.score(batch) => scored,
            }
        } else {
            dispatcher.score(batch).await
        };

        match scored {
            Ok(scored) => {
                if entry.fold(&scored) == FoldOutcome::Discarded {
                    break Outcome::Stopped;
                }
            }
            Err(e) => break e.into(),
        }
    };

    producer.abort();
    drop(batches);
    drop(handle);

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_error_keeps_kind() {
        let outcome = Outcome::from(PipelineError::from(vscan_media::MediaError::InvalidFrameRate(0.0)));
        match outcome {
            Outcome::Failed(kind, _) => assert_eq!(kind, ErrorKind::InvalidFrameRate),
            _ => panic!("expected failure"),
        }
    }
}
