use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::staging::StagedJob;

/// A validated upload form, held in memory until it is staged
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub dir_path: String,
    pub csv: CsvUpload,
    pub anonymize: bool,
}

#[derive(Debug, Clone)]
pub struct CsvUpload {
    /// Sanitized client filename
    pub filename: String,
    pub bytes: Bytes,
}

/// Multipart form accepted by the upload endpoints (documentation only)
#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// Directory containing the DICOM files, resolved by the processor
    pub dir_path: String,
    /// CSV mapping file
    #[schema(value_type = String, format = Binary)]
    pub csv_file: Vec<u8>,
    pub anonymize_flag: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobFailureKind {
    /// The processor reported an error
    Processor,
    /// The processor exceeded the configured time limit
    Timeout,
    Cancelled,
    /// The processor could not be launched or failed on file access
    Io,
}

/// Why a job did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, thiserror::Error)]
#[error("{message}")]
pub struct JobFailure {
    pub kind: JobFailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: JobFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies a processor error. I/O errors anywhere in the chain
    /// (a missing executable, an unreadable staged file) become `Io`.
    pub fn processor(err: anyhow::Error) -> Self {
        let kind = if err.chain().any(|cause| cause.is::<std::io::Error>()) {
            JobFailureKind::Io
        } else {
            JobFailureKind::Processor
        };
        Self::new(kind, format!("{:#}", err))
    }

    pub fn timeout(limit: std::time::Duration) -> Self {
        Self::new(
            JobFailureKind::Timeout,
            format!("processor did not finish within {}s", limit.as_secs()),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(JobFailureKind::Cancelled, "job was cancelled")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    pub dir_path: String,
    pub csv_filename: String,
    pub anonymize: bool,
    pub log_file: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<JobFailure>,
}

impl JobRecord {
    pub fn queued(job: &StagedJob) -> Self {
        Self {
            id: job.id,
            status: JobStatus::Queued,
            dir_path: job.dir_path.clone(),
            csv_filename: job.csv_filename.clone(),
            anonymize: job.anonymize,
            log_file: job.log_name.clone(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub status_url: String,
}
