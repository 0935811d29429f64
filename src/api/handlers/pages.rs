use crate::AppState;
use crate::api::error::AppError;
use axum::{extract::State, response::Html};

/// Serves `<static_dir>/index.html` as-is
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Upload form"),
        (status = 404, description = "Entry page missing")
    ),
    tag = "pages"
)]
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let path = state.config.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Html(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound("index.html not found".to_string()))
        }
        Err(e) => Err(AppError::Internal(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}
