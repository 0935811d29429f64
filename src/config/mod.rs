use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the DICOM upload gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Root directory holding one workspace per job (default: "./work")
    pub work_dir: PathBuf,

    /// Directory served under /static, must contain index.html (default: "./static")
    pub static_dir: PathBuf,

    /// Maximum accepted CSV size in bytes (default: 16 MB)
    pub max_csv_size: usize,

    /// Delete the staged CSV once the processor returns (default: false)
    pub cleanup_staged_csv: bool,

    /// Processor time limit in seconds, 0 means unlimited (default: 0)
    pub job_timeout_secs: u64,

    /// Maximum number of queued jobs processed at once (default: 2)
    pub worker_concurrency: usize,

    /// Capacity of the job submission queue (default: 100)
    pub job_queue_size: usize,

    /// Age after which finished job workspaces are swept, 0 disables (default: 0)
    pub retention_hours: u64,

    /// Interval between retention sweeps in seconds (default: 3600)
    pub cleanup_interval_secs: u64,

    /// Job records kept in memory before the oldest finished ones are evicted (default: 1000)
    pub max_job_records: usize,

    /// Seconds running jobs may keep going after a shutdown signal (default: 30)
    pub shutdown_grace_secs: u64,

    /// Processor type: "command" or "noop" (default: "command")
    pub processor_type: String,

    /// Executable invoked for each job (default: "upload_zip")
    pub processor_command: String,

    /// Extra arguments placed before the job arguments (whitespace separated)
    pub processor_args: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./work"),
            static_dir: PathBuf::from("./static"),
            max_csv_size: 16 * 1024 * 1024, // 16 MB
            cleanup_staged_csv: false,
            job_timeout_secs: 0,
            worker_concurrency: 2,
            job_queue_size: 100,
            retention_hours: 0,
            cleanup_interval_secs: 3600,
            max_job_records: 1000,
            shutdown_grace_secs: 30,
            processor_type: "command".to_string(),
            processor_command: "upload_zip".to_string(),
            processor_args: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            work_dir: env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.work_dir),

            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.static_dir),

            max_csv_size: env::var("MAX_CSV_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_csv_size),

            cleanup_staged_csv: env::var("CLEANUP_STAGED_CSV")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.cleanup_staged_csv),

            job_timeout_secs: env::var("JOB_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.job_timeout_secs),

            worker_concurrency: env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.worker_concurrency)
                .max(1),

            job_queue_size: env::var("JOB_QUEUE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.job_queue_size)
                .max(1),

            retention_hours: env::var("RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retention_hours),

            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.cleanup_interval_secs)
                .max(1),

            max_job_records: env::var("MAX_JOB_RECORDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_job_records)
                .max(1),

            shutdown_grace_secs: env::var("SHUTDOWN_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.shutdown_grace_secs),

            processor_type: env::var("PROCESSOR_TYPE").unwrap_or(default.processor_type),

            processor_command: env::var("PROCESSOR_COMMAND")
                .unwrap_or(default.processor_command),

            processor_args: env::var("PROCESSOR_ARGS")
                .ok()
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(default.processor_args),
        }
    }

    /// Create config for development (no-op processor, staged files removed)
    pub fn development() -> Self {
        Self {
            cleanup_staged_csv: true,
            processor_type: "noop".to_string(),
            ..Self::default()
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn retention(&self) -> Option<Duration> {
        (self.retention_hours > 0).then(|| Duration::from_secs(self.retention_hours * 3600))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
