//! Pipeline metrics, recorded through the `metrics` facade.
//!
//! Nothing is exported unless the binary installs a recorder.

use metrics::{counter, gauge, histogram};
use vscan_models::ErrorKind;

pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "vscan_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vscan_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vscan_jobs_failed_total";
    pub const JOBS_STOPPED_TOTAL: &str = "vscan_jobs_stopped_total";
    pub const JOBS_RUNNING: &str = "vscan_jobs_running";
    pub const BATCH_INFERENCE_SECONDS: &str = "vscan_batch_inference_seconds";
    pub const FRAMES_SCORED_TOTAL: &str = "vscan_frames_scored_total";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
    gauge!(names::JOBS_RUNNING).increment(1.0);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed(kind: ErrorKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_stopped() {
    counter!(names::JOBS_STOPPED_TOTAL).increment(1);
}

/// Pair of [`record_job_started`], once the job leaves the running state.
pub fn record_job_finished_running() {
    gauge!(names::JOBS_RUNNING).decrement(1.0);
}

pub fn record_batch_inference(backend: &'static str, frames: usize, duration_secs: f64) {
    let labels = [("backend", backend.to_string())];
    histogram!(names::BATCH_INFERENCE_SECONDS, &labels).record(duration_secs);
    counter!(names::FRAMES_SCORED_TOTAL, &labels).increment(frames as u64);
}
