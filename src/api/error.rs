use crate::services::converter::ConversionError;
use crate::services::limiter::LimiterError;
use crate::services::storage::StorageError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub const NO_FILE_UPLOADED: &str = "No file uploaded";
pub const FILE_TOO_LARGE: &str = "File too large";
pub const UNEXPECTED_FIELD: &str = "Unexpected field";
pub const INVALID_FILENAME: &str = "Invalid filename";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFilename(e) => {
                tracing::warn!("Rejected upload name: {}", e);
                AppError::BadRequest(INVALID_FILENAME.to_string())
            }
            StorageError::TooLarge { .. } => AppError::BadRequest(FILE_TOO_LARGE.to_string()),
            StorageError::Stream(e) => {
                let over_limit = e
                    .get_ref()
                    .and_then(|inner| inner.downcast_ref::<MultipartError>())
                    .is_some_and(|m| m.status() == StatusCode::PAYLOAD_TOO_LARGE);
                let msg = e.to_string();
                if over_limit || msg.contains("length limit exceeded") {
                    AppError::BadRequest(FILE_TOO_LARGE.to_string())
                } else {
                    AppError::BadRequest(msg)
                }
            }
            other @ (StorageError::Collision(_) | StorageError::Io(_)) => {
                AppError::Upload(other.to_string())
            }
        }
    }
}

impl From<LimiterError> for AppError {
    fn from(err: LimiterError) -> Self {
        AppError::TooManyRequests(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conversion(e) => {
                tracing::error!(kind = e.kind(), "❌ Conversion error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Conversion failed".to_string(),
                )
            }
            AppError::Upload(msg) => {
                tracing::error!("Upload error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Upload failed".to_string())
            }
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
