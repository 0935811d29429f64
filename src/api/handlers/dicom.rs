use crate::AppState;
use crate::api::error::AppError;
use crate::api::multipart::parse_upload_form;
use crate::models::{DetailResponse, JobRecord, UploadForm};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use chrono::Local;

pub const SUCCESS_MESSAGE: &str = "DICOM files uploaded and processed successfully";

#[utoipa::path(
    post,
    path = "/upload-dicom/",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Processor finished successfully", body = DetailResponse),
        (status = 413, description = "CSV file too large", body = DetailResponse),
        (status = 422, description = "Missing or invalid form field", body = DetailResponse),
        (status = 409, description = "Job cancelled through DELETE /jobs/{id}", body = DetailResponse),
        (status = 500, description = "Processor or staging failure", body = DetailResponse),
        (status = 504, description = "Processor timed out", body = DetailResponse)
    ),
    tag = "dicom"
)]
pub async fn upload_dicom(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetailResponse>, AppError> {
    let received_at = Local::now();
    let request = parse_upload_form(multipart, state.config.max_csv_size).await?;

    let job = state.jobs.stage(request, received_at).await?;
    state.registry.insert(JobRecord::queued(&job));
    tracing::info!(
        target: "audit",
        job_id = %job.id,
        dir_path = %job.dir_path,
        anonymize = job.anonymize,
        log_file = %job.log_name,
        "Processing DICOM upload synchronously"
    );

    state.jobs.execute(&state.registry, &job).await?;

    Ok(Json(DetailResponse::new(SUCCESS_MESSAGE)))
}
