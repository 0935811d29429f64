use crate::models::{JobFailure, JobFailureKind};
use crate::services::job_service::JobService;
use crate::services::jobs::JobRegistry;
use crate::services::staging::StagedJob;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, interval_at};
use uuid::Uuid;

pub struct BackgroundWorker {
    jobs: Arc<JobService>,
    registry: JobRegistry,
    receiver: mpsc::Receiver<StagedJob>,
    shutdown: watch::Receiver<bool>,
    semaphore: Arc<Semaphore>,
    running: JoinSet<Uuid>,
    in_flight: HashSet<Uuid>,
    retention: Option<Duration>,
    cleanup_interval: Duration,
    shutdown_grace: Duration,
}

impl BackgroundWorker {
    pub fn new(
        jobs: Arc<JobService>,
        registry: JobRegistry,
        receiver: mpsc::Receiver<StagedJob>,
        shutdown: watch::Receiver<bool>,
        config: &crate::config::GatewayConfig,
    ) -> Self {
        Self {
            jobs,
            registry,
            receiver,
            shutdown,
            semaphore: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            running: JoinSet::new(),
            in_flight: HashSet::new(),
            retention: config.retention(),
            // tokio intervals panic on a zero period
            cleanup_interval: config.cleanup_interval().max(Duration::from_secs(1)),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        let mut cleanup = interval_at(
            Instant::now() + self.cleanup_interval,
            self.cleanup_interval,
        );
        // Jobs stay in the bounded channel until a worker slot is free, so a
        // saturated worker makes submissions fail fast.
        let mut permit: Option<OwnedSemaphorePermit> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                acquired = self.semaphore.clone().acquire_owned(), if permit.is_none() => {
                    match acquired {
                        Ok(acquired) => permit = Some(acquired),
                        Err(_) => break,
                    }
                }
                job = self.receiver.recv(), if permit.is_some() => match (job, permit.take()) {
                    (Some(job), Some(slot)) => self.dispatch(job, slot),
                    _ => {
                        tracing::info!("Job queue closed, stopping worker");
                        break;
                    }
                },
                Some(done) = self.running.join_next(), if !self.running.is_empty() => {
                    if let Ok(id) = done {
                        self.in_flight.remove(&id);
                    }
                }
                _ = cleanup.tick() => {
                    self.sweep_expired().await;
                }
            }
        }

        drop(permit);
        self.drain().await;
    }

    /// Runs the job on its own task, holding `permit` until it finishes
    fn dispatch(&mut self, job: StagedJob, permit: OwnedSemaphorePermit) {
        let jobs = self.jobs.clone();
        let registry = self.registry.clone();

        self.in_flight.insert(job.id);
        self.running.spawn(async move {
            let _permit = permit;
            let _ = jobs.execute(&registry, &job).await;
            job.id
        });
    }

    /// Settles every job before the worker exits: queued jobs are cancelled,
    /// running jobs get the grace period and are cancelled after it.
    async fn drain(&mut self) {
        let stopped = || JobFailure::new(JobFailureKind::Cancelled, "gateway shut down before the job finished");

        self.receiver.close();
        while let Ok(job) = self.receiver.try_recv() {
            if self.registry.cancel_with(job.id, stopped()).is_ok() {
                tracing::warn!(target: "audit", job_id = %job.id, "Queued job abandoned at shutdown");
            }
            self.jobs.release(&job).await;
        }

        if self.running.is_empty() {
            return;
        }
        tracing::info!(
            "⏳ Waiting up to {:?} for {} running job(s)...",
            self.shutdown_grace,
            self.running.len()
        );

        let running = &mut self.running;
        let finished = tokio::time::timeout(self.shutdown_grace, async {
            while running.join_next().await.is_some() {}
        })
        .await;

        if finished.is_err() {
            for id in self.in_flight.drain() {
                if self.registry.cancel_with(id, stopped()).is_ok() {
                    tracing::warn!(target: "audit", job_id = %id, "Running job cancelled at shutdown");
                }
            }
            while self.running.join_next().await.is_some() {}
        }
    }

    /// Deletes finished workspaces older than the retention period.
    /// Returns the number of workspaces removed.
    pub async fn sweep_expired(&self) -> usize {
        let Some(retention) = self.retention else {
            return 0;
        };
        tracing::info!("🧹 Sweeping job workspaces older than {:?}...", retention);

        let staging = self.jobs.staging();
        let expired = match staging.expired_workspaces(retention).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Failed to scan work directory: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for id in expired {
            if self.registry.is_active(id) {
                continue;
            }
            match staging.remove_workspace(id).await {
                Ok(()) => {
                    self.registry.remove(id);
                    removed += 1;
                }
                Err(e) => tracing::error!(job_id = %id, "Failed to remove workspace: {}", e),
            }
        }

        tracing::info!("✅ Workspace sweep completed, {} removed", removed);
        removed
    }
}
