use crate::models::{JobFailure, JobRecord, JobStatus};
use crate::services::staging::StagedJob;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::AbortHandle;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CancelError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} has already finished")]
    AlreadyFinished(Uuid),
}

struct JobEntry {
    record: JobRecord,
    abort: Option<AbortHandle>,
}

/// Records kept when no explicit limit is configured
pub const DEFAULT_MAX_JOB_RECORDS: usize = 1000;

/// In-memory job records, shared between handlers and the worker
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<Uuid, JobEntry>>,
    max_records: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_JOB_RECORDS)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Once more than `max_records` are held, the oldest finished records
    /// are evicted. Queued and running jobs are never evicted.
    pub fn with_limit(max_records: usize) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            max_records: max_records.max(1),
        }
    }

    pub fn insert(&self, record: JobRecord) {
        self.jobs.insert(
            record.id,
            JobEntry {
                record,
                abort: None,
            },
        );
        self.evict_finished();
    }

    fn evict_finished(&self) {
        let excess = self.jobs.len().saturating_sub(self.max_records);
        if excess == 0 {
            return;
        }

        let mut finished: Vec<_> = self
            .jobs
            .iter()
            .filter(|entry| entry.record.status.is_finished())
            .map(|entry| (entry.record.created_at, entry.record.id))
            .collect();
        finished.sort();

        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
        tracing::debug!("Evicted {} finished job records", excess);
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.get(&id).map(|entry| entry.record.clone())
    }

    /// All records, newest first
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> =
            self.jobs.iter().map(|entry| entry.record.clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn remove(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.remove(&id).map(|(_, entry)| entry.record)
    }

    /// Moves a queued job to running. Returns false if the job is gone or
    /// was cancelled while waiting.
    pub fn mark_running(&self, id: Uuid, abort: AbortHandle) -> bool {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return false;
        };
        if entry.record.status != JobStatus::Queued {
            return false;
        }
        entry.record.status = JobStatus::Running;
        entry.record.started_at = Some(Utc::now());
        entry.abort = Some(abort);
        true
    }

    /// Records the outcome of a running job. A job cancelled in the
    /// meantime keeps its cancelled status.
    pub fn finish(&self, id: Uuid, outcome: Result<(), JobFailure>) {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return;
        };
        if entry.record.status != JobStatus::Running {
            return;
        }
        entry.abort = None;
        entry.record.finished_at = Some(Utc::now());
        match outcome {
            Ok(()) => entry.record.status = JobStatus::Succeeded,
            Err(failure) => {
                entry.record.status = JobStatus::Failed;
                entry.record.error = Some(failure);
            }
        }
    }

    pub fn cancel(&self, id: Uuid) -> Result<JobRecord, CancelError> {
        self.cancel_with(id, JobFailure::cancelled())
    }

    /// Cancels a queued or running job, recording `reason` as its failure
    pub fn cancel_with(&self, id: Uuid, reason: JobFailure) -> Result<JobRecord, CancelError> {
        let mut entry = self.jobs.get_mut(&id).ok_or(CancelError::NotFound(id))?;
        if entry.record.status.is_finished() {
            return Err(CancelError::AlreadyFinished(id));
        }
        if let Some(abort) = entry.abort.take() {
            abort.abort();
        }
        entry.record.status = JobStatus::Cancelled;
        entry.record.finished_at = Some(Utc::now());
        entry.record.error = Some(reason);
        Ok(entry.record.clone())
    }

    /// True while the job is queued or running
    pub fn is_active(&self, id: Uuid) -> bool {
        self.jobs
            .get(&id)
            .is_some_and(|entry| !entry.record.status.is_finished())
    }

    /// (queued, running)
    pub fn counts(&self) -> (usize, usize) {
        self.jobs
            .iter()
            .fold((0, 0), |(queued, running), entry| match entry.record.status {
                JobStatus::Queued => (queued + 1, running),
                JobStatus::Running => (queued, running + 1),
                _ => (queued, running),
            })
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job queue is full, please try again later")]
    Full,

    #[error("Job queue is closed")]
    Closed,
}

/// Bounded submission side of the worker queue
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<StagedJob>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StagedJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn submit(&self, job: StagedJob) -> Result<(), QueueError> {
        let id = job.id;
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(job_id = %id, "Job queue is full, rejecting job");
                QueueError::Full
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        tracing::info!(job_id = %id, "Enqueued DICOM processing job");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobFailureKind;
    use std::path::PathBuf;

    fn staged() -> StagedJob {
        StagedJob {
            id: Uuid::new_v4(),
            workspace: PathBuf::from("/tmp/work"),
            timestamp: "20240101_000000".into(),
            log_name: "log.20240101_000000.txt".into(),
            log_path: PathBuf::from("/tmp/work/log.20240101_000000.txt"),
            csv_filename: "ids.csv".into(),
            csv_path: PathBuf::from("/tmp/work/temp_ids.csv"),
            dir_path: "/data".into(),
            anonymize: false,
        }
    }

    fn registry_with_job() -> (JobRegistry, Uuid) {
        let registry = JobRegistry::new();
        let job = staged();
        registry.insert(JobRecord::queued(&job));
        (registry, job.id)
    }

    #[test]
    fn test_lifecycle_success() {
        let (registry, id) = registry_with_job();
        assert_eq!(registry.counts(), (1, 0));

        let (abort, _reg) = AbortHandle::new_pair();
        assert!(registry.mark_running(id, abort));
        assert_eq!(registry.counts(), (0, 1));
        assert!(registry.is_active(id));

        registry.finish(id, Ok(()));
        let record = registry.get(id).unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());
        assert!(!registry.is_active(id));
    }

    #[test]
    fn test_lifecycle_failure_keeps_typed_error() {
        let (registry, id) = registry_with_job();
        let (abort, _reg) = AbortHandle::new_pair();
        registry.mark_running(id, abort);
        registry.finish(
            id,
            Err(JobFailure::new(JobFailureKind::Processor, "directory not found")),
        );

        let record = registry.get(id).unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        let error = record.error.unwrap();
        assert_eq!(error.kind, JobFailureKind::Processor);
        assert_eq!(error.message, "directory not found");
    }

    #[test]
    fn test_cancel_queued_job_prevents_start() {
        let (registry, id) = registry_with_job();
        let record = registry.cancel(id).unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);

        let (abort, _reg) = AbortHandle::new_pair();
        assert!(!registry.mark_running(id, abort));
        assert_eq!(
            registry.cancel(id).unwrap_err(),
            CancelError::AlreadyFinished(id)
        );
    }

    #[test]
    fn test_cancel_running_job_aborts() {
        let (registry, id) = registry_with_job();
        let (abort, abort_registration) = AbortHandle::new_pair();
        let observer = abort.clone();
        drop(abort_registration);
        registry.mark_running(id, abort);

        registry.cancel(id).unwrap();
        assert!(observer.is_aborted());

        // The worker's late outcome does not overwrite the cancellation
        registry.finish(id, Ok(()));
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_cancel_unknown_job() {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(registry.cancel(id).unwrap_err(), CancelError::NotFound(id));
    }

    fn finished_record(age_secs: i64) -> JobRecord {
        let mut record = JobRecord::queued(&staged());
        record.created_at = Utc::now() - chrono::Duration::seconds(age_secs);
        record.status = JobStatus::Succeeded;
        record
    }

    #[test]
    fn test_limit_evicts_oldest_finished_records() {
        let registry = JobRegistry::with_limit(2);
        let oldest = finished_record(30);
        let newer = finished_record(20);
        registry.insert(oldest.clone());
        registry.insert(newer.clone());

        let job = staged();
        registry.insert(JobRecord::queued(&job));

        assert!(registry.get(oldest.id).is_none());
        assert!(registry.get(newer.id).is_some());
        assert!(registry.is_active(job.id));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_limit_never_evicts_active_jobs() {
        let registry = JobRegistry::with_limit(1);
        let first = staged();
        let second = staged();
        registry.insert(JobRecord::queued(&first));
        registry.insert(JobRecord::queued(&second));

        assert!(registry.is_active(first.id));
        assert!(registry.is_active(second.id));
        assert_eq!(registry.counts(), (2, 0));
    }

    #[test]
    fn test_cancel_with_reason() {
        let (registry, id) = registry_with_job();
        let record = registry
            .cancel_with(
                id,
                JobFailure::new(JobFailureKind::Cancelled, "gateway shut down"),
            )
            .unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert_eq!(record.error.unwrap().message, "gateway shut down");
        assert!(!registry.is_active(id));
    }

    #[tokio::test]
    async fn test_queue_rejects_when_full() {
        let (queue, mut rx) = JobQueue::new(1);
        queue.submit(staged()).unwrap();
        assert!(matches!(queue.submit(staged()), Err(QueueError::Full)));

        assert!(rx.recv().await.is_some());
        drop(rx);
        assert!(matches!(queue.submit(staged()), Err(QueueError::Closed)));
    }
}
