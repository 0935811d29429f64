use crate::models::UploadRequest;
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// strftime pattern used for log file names and their first line
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const STAGED_CSV_PREFIX: &str = "temp_";

/// A request whose artifacts have been written to its own workspace
#[derive(Debug, Clone)]
pub struct StagedJob {
    pub id: Uuid,
    pub workspace: PathBuf,
    pub timestamp: String,
    pub log_name: String,
    pub log_path: PathBuf,
    pub csv_filename: String,
    pub csv_path: PathBuf,
    pub dir_path: String,
    pub anonymize: bool,
}

/// Writes request artifacts under `<root>/<job id>/`
pub struct StagingService {
    root: PathBuf,
}

impl StagingService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn format_timestamp(at: DateTime<Local>) -> String {
        at.format(LOG_TIMESTAMP_FORMAT).to_string()
    }

    pub fn log_file_name(timestamp: &str) -> String {
        format!("log.{}.txt", timestamp)
    }

    pub fn staged_csv_name(filename: &str) -> String {
        format!("{}{}", STAGED_CSV_PREFIX, filename)
    }

    /// Creates the workspace, the log file and the staged CSV, in that order.
    /// Nothing is rolled back if a later step fails.
    pub async fn stage(
        &self,
        request: UploadRequest,
        received_at: DateTime<Local>,
    ) -> io::Result<StagedJob> {
        let id = Uuid::new_v4();
        let workspace = self.root.join(id.to_string());
        fs::create_dir_all(&workspace).await?;

        // 1. Log file
        let timestamp = Self::format_timestamp(received_at);
        let log_name = Self::log_file_name(&timestamp);
        let log_path = workspace.join(&log_name);
        let mut log_file = fs::File::create(&log_path).await?;
        log_file.write_all(format!("{}\n", timestamp).as_bytes()).await?;
        log_file.flush().await?;

        // 2. Staged CSV
        let csv_path = workspace.join(Self::staged_csv_name(&request.csv.filename));
        let mut csv_file = fs::File::create(&csv_path).await?;
        csv_file.write_all(&request.csv.bytes).await?;
        csv_file.flush().await?;

        tracing::debug!(
            job_id = %id,
            csv_bytes = request.csv.bytes.len(),
            "Staged upload in {}",
            workspace.display()
        );

        Ok(StagedJob {
            id,
            workspace,
            timestamp,
            log_name,
            log_path,
            csv_filename: request.csv.filename,
            csv_path,
            dir_path: request.dir_path,
            anonymize: request.anonymize,
        })
    }

    /// Removes the staged CSV, leaving the log in place
    pub async fn discard_csv(&self, job: &StagedJob) -> io::Result<()> {
        match fs::remove_file(&job.csv_path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    pub async fn remove_workspace(&self, id: Uuid) -> io::Result<()> {
        match fs::remove_dir_all(self.root.join(id.to_string())).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Lists job workspaces last modified more than `max_age` ago.
    /// Entries whose name is not a job id are ignored.
    pub async fn expired_workspaces(&self, max_age: Duration) -> io::Result<Vec<Uuid>> {
        let mut expired = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(expired),
            Err(e) => return Err(e),
        };
        let now = SystemTime::now();

        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };

            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age >= max_age {
                expired.push(id);
            }
        }

        Ok(expired)
    }
}
