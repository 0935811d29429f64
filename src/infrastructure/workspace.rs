use crate::config::GatewayConfig;
use crate::services::staging::StagingService;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_workspace(config: &GatewayConfig) -> anyhow::Result<Arc<StagingService>> {
    let staging = StagingService::new(&config.work_dir);
    staging
        .ensure_root()
        .await
        .with_context(|| format!("Failed to create work directory {}", config.work_dir.display()))?;

    info!("📂 Job workspaces: {}", config.work_dir.display());
    Ok(Arc::new(staging))
}
