pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::GatewayConfig;
use crate::services::job_service::JobService;
use crate::services::jobs::{JobQueue, JobRegistry};
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::pages::index,
        api::handlers::dicom::upload_dicom,
        api::handlers::jobs::submit_job,
        api::handlers::jobs::list_jobs,
        api::handlers::jobs::get_job,
        api::handlers::jobs::cancel_job,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::UploadForm,
            models::DetailResponse,
            models::JobStatus,
            models::JobFailureKind,
            models::JobFailure,
            models::JobRecord,
            models::SubmitJobResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "dicom", description = "Synchronous DICOM batch submission"),
        (name = "jobs", description = "Asynchronous DICOM batch jobs"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub jobs: Arc<JobService>,
    pub registry: JobRegistry,
    pub queue: JobQueue,
}

pub fn create_app(state: AppState) -> Router {
    // Multipart framing overhead on top of the CSV itself
    let body_limit = state.config.max_csv_size + 1024 * 1024;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::pages::index))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .route("/health", get(api::handlers::health::health_check))
        .route("/upload-dicom/", post(api::handlers::dicom::upload_dicom))
        .route("/upload-dicom", post(api::handlers::dicom::upload_dicom))
        .route(
            "/jobs",
            post(api::handlers::jobs::submit_job).get(api::handlers::jobs::list_jobs),
        )
        .route(
            "/jobs/:id",
            get(api::handlers::jobs::get_job).delete(api::handlers::jobs::cancel_job),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
