use crate::AppState;
use crate::api::error::AppError;
use crate::api::multipart::parse_upload_form;
use crate::models::{DetailResponse, JobRecord, SubmitJobResponse, UploadForm};
use crate::services::jobs::{CancelError, QueueError};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::StatusCode,
};
use chrono::Local;
use uuid::Uuid;

fn parse_job_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound(format!("Job {} not found", id)))
}

#[utoipa::path(
    post,
    path = "/jobs",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Job staged and queued", body = SubmitJobResponse),
        (status = 413, description = "CSV file too large", body = DetailResponse),
        (status = 422, description = "Missing or invalid form field", body = DetailResponse),
        (status = 503, description = "Job queue is full", body = DetailResponse)
    ),
    tag = "jobs"
)]
pub async fn submit_job(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), AppError> {
    let received_at = Local::now();
    let request = parse_upload_form(multipart, state.config.max_csv_size).await?;

    let job = state.jobs.stage(request, received_at).await?;
    let job_id = job.id;
    state.registry.insert(JobRecord::queued(&job));

    if let Err(e) = state.queue.submit(job) {
        state.registry.remove(job_id);
        if let Err(cleanup) = state.jobs.staging().remove_workspace(job_id).await {
            tracing::warn!(job_id = %job_id, "Failed to remove rejected workspace: {}", cleanup);
        }
        return Err(match e {
            QueueError::Full => AppError::Unavailable(e.to_string()),
            QueueError::Closed => AppError::Internal(e.to_string()),
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id,
            status: crate::models::JobStatus::Queued,
            status_url: format!("/jobs/{}", job_id),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/jobs",
    responses(
        (status = 200, description = "All known jobs, newest first", body = Vec<JobRecord>)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobRecord>> {
    Json(state.registry.list())
}

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job status", body = JobRecord),
        (status = 404, description = "Job not found", body = DetailResponse)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, AppError> {
    let job_id = parse_job_id(&id)?;
    state
        .registry
        .get(job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
}

#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job cancelled", body = JobRecord),
        (status = 404, description = "Job not found", body = DetailResponse),
        (status = 409, description = "Job already finished", body = DetailResponse)
    ),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, AppError> {
    let job_id = parse_job_id(&id)?;
    let record = state.registry.cancel(job_id).map_err(|e| match e {
        CancelError::NotFound(_) => AppError::NotFound(e.to_string()),
        CancelError::AlreadyFinished(_) => AppError::Conflict(e.to_string()),
    })?;

    tracing::info!(target: "audit", job_id = %job_id, "Job cancelled by client");
    Ok(Json(record))
}
