//! In-memory job registry.
//!
//! The registry map is guarded by one `RwLock` that is held only to look up,
//! insert or remove entries. Each job's mutable state sits behind its own
//! mutex, so polling one job never waits on another. Neither lock is held
//! across an await point.
//!
//! A durable deployment would replace this with a key-value store keyed by
//! job id holding the serialized [`Job`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use vscan_models::{ErrorKind, Job, JobId, JobPage, JobStatus};

use crate::aggregator::{ResultAggregator, ScoredFrame};
use crate::metrics;

/// Mutable state of one job.
#[derive(Debug)]
pub struct JobState {
    pub job: Job,
    /// Set by a stop request on a running job, cleared never
    pub stop_requested: bool,
}

/// Outcome of folding a batch into a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    /// The job was stopped or finished; nothing was recorded
    Discarded,
}

/// One registry entry: the job plus its cancellation signal.
#[derive(Debug)]
pub struct JobEntry {
    state: Mutex<JobState>,
    cancel: watch::Sender<bool>,
}

impl JobEntry {
    pub fn new(job: Job) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            state: Mutex::new(JobState {
                job,
                stop_requested: false,
            }),
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        // A panic mid-update leaves the job readable; keep serving it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` inside the job's exclusive section.
    pub fn update<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Consistent copy of the job.
    pub fn snapshot(&self) -> Job {
        self.lock().job.clone()
    }

    pub fn status(&self) -> JobStatus {
        self.lock().job.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    /// Receiver that flips to `true` once a stop is requested.
    pub fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Request a stop.
    ///
    /// A pending job becomes stopped at once. A running job is flagged and
    /// stops at its next batch boundary. Terminal jobs are left alone.
    /// Returns whether this call changed anything.
    pub fn request_stop(&self) -> bool {
        let (changed, stopped) = self.update(|state| match state.job.status {
            JobStatus::Pending => {
                let stopped = state.job.stop();
                (stopped, stopped)
            }
            JobStatus::Running if !state.stop_requested => {
                state.stop_requested = true;
                (true, false)
            }
            _ => (false, false),
        });

        if stopped {
            metrics::record_job_stopped();
        }
        if changed {
            self.cancel.send_replace(true);
        }
        changed
    }

    /// Fold a scored batch unless the job has been stopped or finished.
    pub fn fold(&self, batch: &[ScoredFrame]) -> FoldOutcome {
        self.update(|state| {
            if state.stop_requested || state.job.status != JobStatus::Running {
                return FoldOutcome::Discarded;
            }
            ResultAggregator::fold(&mut state.job, batch);
            FoldOutcome::Applied
        })
    }

    pub fn set_total_frames(&self, total_frames: Option<u64>) {
        self.update(|state| ResultAggregator::set_total_frames(&mut state.job, total_frames));
    }

    /// Pending -> Running. False if the job was stopped meanwhile.
    pub fn start(&self) -> bool {
        self.update(|state| state.job.start())
    }

    pub fn complete(&self) -> bool {
        self.update(|state| state.job.complete())
    }

    pub fn fail(&self, kind: ErrorKind, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|state| state.job.fail(kind, message))
    }

    /// Move a running job whose stop was requested to the stopped state.
    pub fn mark_stopped(&self) -> bool {
        let stopped = self.update(|state| state.job.stop());
        if stopped {
            metrics::record_job_stopped();
        }
        stopped
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_seq: u64,
    /// Creation order
    order: BTreeMap<u64, JobId>,
    jobs: HashMap<JobId, (u64, Arc<JobEntry>)>,
}

/// Map of job id to entry, iterable in creation order.
#[derive(Debug, Default)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new job.
    pub fn insert(&self, job: Job) -> Arc<JobEntry> {
        let id = job.id.clone();
        let entry = Arc::new(JobEntry::new(job));

        let mut inner = self.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, id.clone());
        inner.jobs.insert(id, (seq, Arc::clone(&entry)));
        entry
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.read().jobs.get(id).map(|(_, entry)| Arc::clone(entry))
    }

    pub fn remove(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        let mut inner = self.write();
        let (seq, entry) = inner.jobs.remove(id)?;
        inner.order.remove(&seq);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in creation order.
    pub fn entries(&self) -> Vec<Arc<JobEntry>> {
        let inner = self.read();
        inner
            .order
            .values()
            .filter_map(|id| inner.jobs.get(id).map(|(_, entry)| Arc::clone(entry)))
            .collect()
    }

    /// A page of job summaries in creation order, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> JobPage {
        let summaries: Vec<_> = self
            .entries()
            .iter()
            .map(|entry| entry.update(|state| state.job.summary()))
            .filter(|summary| status.map_or(true, |s| summary.status == s))
            .collect();

        let total = summaries.len();
        let items = summaries.into_iter().skip(offset).take(limit).collect();

        JobPage {
            items,
            total,
            limit,
            offset,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use vscan_models::{AnalysisSettings, SourceInfo};

    use ::metrics::{
        Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString,
        Unit,
    };

    /// Counts increments of the stopped-jobs counter.
    #[derive(Default)]
    struct StopCount(AtomicU64);

    impl CounterFn for StopCount {
        fn increment(&self, value: u64) {
            self.0.fetch_add(value, Ordering::SeqCst);
        }

        fn absolute(&self, value: u64) {
            self.0.fetch_max(value, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StopRecorder(Arc<StopCount>);

    impl StopRecorder {
        fn count(&self) -> u64 {
            self.0 .0.load(Ordering::SeqCst)
        }
    }

    impl Recorder for StopRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            if key.name() == metrics::names::JOBS_STOPPED_TOTAL {
                Counter::from_arc(Arc::clone(&self.0))
            } else {
                Counter::noop()
            }
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    fn new_job() -> Job {
        Job::new(
            SourceInfo::Url {
                url: "https://example.com/v.mp4".into(),
            },
            &AnalysisSettings::default(),
        )
    }

    #[test]
    fn test_list_in_creation_order() {
        let registry = JobRegistry::new();
        let ids: Vec<JobId> = (0..5).map(|_| registry.insert(new_job()).snapshot().id).collect();

        let page = registry.list(None, 2, 1);
        assert_eq!(page.total, 5);
        assert_eq!(
            page.items.iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
            ids[1..3].to_vec()
        );
    }

    #[test]
    fn test_list_with_status_filter() {
        let registry = JobRegistry::new();
        let first = registry.insert(new_job());
        registry.insert(new_job());
        first.request_stop();

        let page = registry.list(Some(JobStatus::Stopped), 10, 0);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status, JobStatus::Stopped);

        assert_eq!(registry.list(Some(JobStatus::Pending), 10, 0).total, 1);
        assert_eq!(registry.list(None, 10, 5).items.len(), 0);
    }

    #[test]
    fn test_remove() {
        let registry = JobRegistry::new();
        let entry = registry.insert(new_job());
        let id = entry.snapshot().id;

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_pending_is_immediate() {
        let entry = JobEntry::new(new_job());
        let cancel = entry.subscribe_cancel();

        assert!(entry.request_stop());
        assert_eq!(entry.status(), JobStatus::Stopped);
        assert!(*cancel.borrow());
        assert!(!entry.request_stop());
    }

    #[test]
    fn test_stop_running_waits_for_boundary() {
        let entry = JobEntry::new(new_job());
        assert!(entry.start());

        assert!(entry.request_stop());
        assert_eq!(entry.status(), JobStatus::Running);
        assert!(entry.stop_requested());

        let batch = [ScoredFrame {
            frame_number: 0,
            timestamp_seconds: 0.0,
            score: 0.99,
        }];
        assert_eq!(entry.fold(&batch), FoldOutcome::Discarded);
        assert!(entry.snapshot().detections.is_empty());

        assert!(entry.mark_stopped());
        assert_eq!(entry.status(), JobStatus::Stopped);
    }

    #[test]
    fn test_fold_requires_running() {
        let entry = JobEntry::new(new_job());
        let batch = [ScoredFrame {
            frame_number: 0,
            timestamp_seconds: 0.0,
            score: 0.99,
        }];
        assert_eq!(entry.fold(&batch), FoldOutcome::Discarded);

        entry.start();
        assert_eq!(entry.fold(&batch), FoldOutcome::Applied);
        assert_eq!(entry.snapshot().violent_frame_count, 1);
    }

    #[test]
    fn test_stop_counted_once_when_pending() {
        let recorder = StopRecorder::default();
        let entry = JobEntry::new(new_job());

        ::metrics::with_local_recorder(&recorder, || {
            assert!(entry.request_stop());
            assert!(!entry.request_stop());
            // the pipeline noticing the stop later must not count it again
            assert!(!entry.mark_stopped());
        });

        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn test_stop_counted_at_boundary_when_running() {
        let recorder = StopRecorder::default();
        let entry = JobEntry::new(new_job());
        entry.start();

        ::metrics::with_local_recorder(&recorder, || {
            assert!(entry.request_stop());
            assert_eq!(recorder.count(), 0);
            assert!(entry.mark_stopped());
        });

        assert_eq!(recorder.count(), 1);
    }
}
