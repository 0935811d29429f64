use crate::config::GatewayConfig;
use crate::models::{JobFailure, UploadRequest};
use crate::services::jobs::JobRegistry;
use crate::services::processor::BatchProcessor;
use crate::services::staging::{StagedJob, StagingService};
use chrono::{DateTime, Local};
use futures::future::{AbortHandle, Abortable};
use std::sync::Arc;
use std::time::Duration;

/// Stages uploads and runs them through the batch processor
pub struct JobService {
    staging: Arc<StagingService>,
    processor: Arc<dyn BatchProcessor>,
    timeout: Option<Duration>,
    cleanup_staged_csv: bool,
}

impl JobService {
    pub fn new(
        staging: Arc<StagingService>,
        processor: Arc<dyn BatchProcessor>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            staging,
            processor,
            timeout: config.job_timeout(),
            cleanup_staged_csv: config.cleanup_staged_csv,
        }
    }

    pub fn staging(&self) -> &StagingService {
        &self.staging
    }

    pub fn processor(&self) -> &dyn BatchProcessor {
        self.processor.as_ref()
    }

    pub async fn stage(
        &self,
        request: UploadRequest,
        received_at: DateTime<Local>,
    ) -> std::io::Result<StagedJob> {
        self.staging.stage(request, received_at).await
    }

    /// Invokes the processor exactly once for the job, bounded by the
    /// configured timeout, then applies the staged CSV cleanup policy.
    pub async fn run(&self, job: &StagedJob) -> Result<(), JobFailure> {
        let invocation =
            self.processor
                .process_job(&job.dir_path, &job.csv_path, job.anonymize, &job.log_path);

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(result) => result.map_err(JobFailure::processor),
                Err(_) => Err(JobFailure::timeout(limit)),
            },
            None => invocation.await.map_err(JobFailure::processor),
        };

        self.release(job).await;

        match &outcome {
            Ok(()) => tracing::info!(target: "audit", job_id = %job.id, "Job succeeded"),
            Err(failure) => tracing::warn!(
                target: "audit",
                job_id = %job.id,
                kind = ?failure.kind,
                "Job failed: {}",
                failure.message
            ),
        }
        outcome
    }

    /// Runs a job already inserted into `registry`, keeping its record
    /// current. The job can be cancelled through the registry while it
    /// runs, and a job cancelled before it starts is never run.
    pub async fn execute(&self, registry: &JobRegistry, job: &StagedJob) -> Result<(), JobFailure> {
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        if !registry.mark_running(job.id, abort_handle) {
            tracing::info!(job_id = %job.id, "Skipping job cancelled before start");
            self.release(job).await;
            return Err(JobFailure::cancelled());
        }

        tracing::info!(target: "audit", job_id = %job.id, dir_path = %job.dir_path, "Job started");
        match Abortable::new(self.run(job), abort_registration).await {
            Ok(outcome) => {
                registry.finish(job.id, outcome.clone());
                outcome
            }
            Err(_aborted) => {
                tracing::info!(target: "audit", job_id = %job.id, "Job cancelled while running");
                self.release(job).await;
                Err(registry
                    .get(job.id)
                    .and_then(|record| record.error)
                    .unwrap_or_else(JobFailure::cancelled))
            }
        }
    }

    /// Applies the staged CSV cleanup policy. Cleanup failures are logged,
    /// never reported as job failures.
    pub async fn release(&self, job: &StagedJob) {
        if !self.cleanup_staged_csv {
            return;
        }
        if let Err(e) = self.staging.discard_csv(job).await {
            tracing::warn!(job_id = %job.id, "Failed to remove staged CSV: {}", e);
        }
    }
}
