use crate::config::GatewayConfig;
use crate::services::processor::{BatchProcessor, create_processor};
use std::sync::Arc;
use tracing::info;

pub async fn setup_processor(config: &GatewayConfig) -> Arc<dyn BatchProcessor> {
    let processor = create_processor(
        &config.processor_type,
        &config.processor_command,
        &config.processor_args,
    );

    if processor.health_check().await {
        info!("🧩 Batch processor ready ({})", processor.name());
    } else {
        tracing::warn!(
            "⚠️  Batch processor '{}' not found! Jobs will fail until it is installed.",
            config.processor_command
        );
    }

    processor.into()
}
