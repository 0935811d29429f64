use crate::api::error::AppError;
use crate::models::{CsvUpload, UploadRequest};
use crate::utils::validation::{DEFAULT_CSV_FILENAME, parse_form_bool, sanitize_filename};
use axum::extract::Multipart;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use bytes::BytesMut;

pub const DIR_PATH_FIELD: &str = "dir_path";
pub const CSV_FILE_FIELD: &str = "csv_file";
pub const ANONYMIZE_FIELD: &str = "anonymize_flag";

fn field_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::Validation(err_msg)
    }
}

fn duplicate(name: &str) -> AppError {
    AppError::Validation(format!("Field '{}' was sent more than once", name))
}

fn missing(name: &str) -> AppError {
    AppError::Validation(format!("Missing required field: {}", name))
}

/// Reads the upload form into memory. Nothing touches the filesystem here,
/// so a rejected form leaves no artifacts behind.
pub async fn parse_upload_form(
    multipart: Result<Multipart, MultipartRejection>,
    max_csv_size: usize,
) -> Result<UploadRequest, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;

    let mut dir_path: Option<String> = None;
    let mut anonymize: Option<bool> = None;
    let mut csv: Option<CsvUpload> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            DIR_PATH_FIELD => {
                if dir_path.is_some() {
                    return Err(duplicate(DIR_PATH_FIELD));
                }
                let text = field.text().await.map_err(field_error)?;
                if text.trim().is_empty() {
                    return Err(AppError::Validation(format!(
                        "Field '{}' must not be empty",
                        DIR_PATH_FIELD
                    )));
                }
                dir_path = Some(text);
            }
            ANONYMIZE_FIELD => {
                if anonymize.is_some() {
                    return Err(duplicate(ANONYMIZE_FIELD));
                }
                let text = field.text().await.map_err(field_error)?;
                anonymize = Some(
                    parse_form_bool(ANONYMIZE_FIELD, &text)
                        .map_err(|e| AppError::Validation(e.to_string()))?,
                );
            }
            CSV_FILE_FIELD => {
                if csv.is_some() {
                    return Err(duplicate(CSV_FILE_FIELD));
                }
                // A part without a filename is a plain text field, not a file
                let Some(original_filename) = field.file_name() else {
                    return Err(AppError::Validation(format!(
                        "Field '{}' must be a file upload",
                        CSV_FILE_FIELD
                    )));
                };
                let original_filename = match original_filename {
                    "" => DEFAULT_CSV_FILENAME.to_string(),
                    name => name.to_string(),
                };
                let filename = sanitize_filename(&original_filename)
                    .map_err(|e| AppError::Validation(e.to_string()))?;

                let mut buffer = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(field_error)? {
                    if buffer.len() + chunk.len() > max_csv_size {
                        return Err(AppError::PayloadTooLarge(format!(
                            "CSV file exceeds the maximum size of {} bytes",
                            max_csv_size
                        )));
                    }
                    buffer.extend_from_slice(&chunk);
                }

                csv = Some(CsvUpload {
                    filename,
                    bytes: buffer.freeze(),
                });
            }
            other => {
                tracing::debug!("Ignoring unexpected form field '{}'", other);
            }
        }
    }

    Ok(UploadRequest {
        dir_path: dir_path.ok_or_else(|| missing(DIR_PATH_FIELD))?,
        csv: csv.ok_or_else(|| missing(CSV_FILE_FIELD))?,
        anonymize: anonymize.ok_or_else(|| missing(ANONYMIZE_FIELD))?,
    })
}
