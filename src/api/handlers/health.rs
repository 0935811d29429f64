use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub processor: String,
    pub processor_available: bool,
    pub work_dir: String,
    pub queued: usize,
    pub running: usize,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let processor = state.jobs.processor();
    let processor_available = processor.health_check().await;
    let work_dir_ok = tokio::fs::metadata(state.jobs.staging().root())
        .await
        .is_ok_and(|m| m.is_dir());
    let (queued, running) = state.registry.counts();

    Json(HealthResponse {
        status: if processor_available && work_dir_ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        processor: processor.name().to_string(),
        processor_available,
        work_dir: state.jobs.staging().root().display().to_string(),
        queued,
        running,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
