use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// External batch routine that walks a DICOM directory, applies the CSV
/// mapping, optionally anonymizes, and appends progress to the log file.
#[async_trait::async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Run one job to completion. An `Err` carries the message shown to clients.
    async fn process_job(
        &self,
        dir_path: &str,
        csv_path: &Path,
        anonymize: bool,
        log_path: &Path,
    ) -> Result<()>;

    /// Check if the processor can be invoked
    async fn health_check(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Runs an executable per job:
/// `<program> [args..] <dir_path> <csv_path> <true|false> <log_path>`
///
/// The child inherits the gateway's working directory and is killed if the
/// job future is dropped (timeout or cancellation).
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
}

impl CommandProcessor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn resolve_program(&self) -> Option<std::path::PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

#[async_trait::async_trait]
impl BatchProcessor for CommandProcessor {
    async fn process_job(
        &self,
        dir_path: &str,
        csv_path: &Path,
        anonymize: bool,
        log_path: &Path,
    ) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(dir_path)
            .arg(csv_path)
            .arg(if anonymize { "true" } else { "false" })
            .arg(log_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::info!(
            program = %self.program,
            dir_path = %dir_path,
            anonymize = anonymize,
            "Launching batch processor"
        );

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to launch processor '{}'", self.program))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("processor exited with {}", output.status));

        tracing::warn!(program = %self.program, status = %output.status, "Batch processor failed: {}", message);
        Err(anyhow!(message))
    }

    async fn health_check(&self) -> bool {
        self.resolve_program().is_some()
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// No-op processor for development and dry runs (always succeeds)
pub struct NoOpProcessor;

#[async_trait::async_trait]
impl BatchProcessor for NoOpProcessor {
    async fn process_job(
        &self,
        dir_path: &str,
        _csv_path: &Path,
        _anonymize: bool,
        _log_path: &Path,
    ) -> Result<()> {
        tracing::debug!("NoOp processor skipping {}", dir_path);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Factory function to create the processor named by config
pub fn create_processor(
    processor_type: &str,
    program: &str,
    args: &[String],
) -> Box<dyn BatchProcessor> {
    match processor_type.to_lowercase().as_str() {
        "command" => Box::new(CommandProcessor::new(program, args.to_vec())),
        "noop" | "none" | "disabled" => Box::new(NoOpProcessor),
        _ => {
            tracing::warn!("Unknown processor type '{}', using CommandProcessor", processor_type);
            Box::new(CommandProcessor::new(program, args.to_vec()))
        }
    }
}
