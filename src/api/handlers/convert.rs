use crate::AppState;
use crate::api::error::{AppError, FILE_TOO_LARGE, NO_FILE_UPLOADED, UNEXPECTED_FIELD};
use crate::models::{ErrorResponse, OfficeUpload, UploadedFile};
use crate::services::storage::ScratchFiles;
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

/// Multipart field carrying the document
pub const FILE_FIELD: &str = "file";

#[utoipa::path(
    post,
    path = "/api/office-to-pdf",
    request_body(content = OfficeUpload, content_type = "multipart/form-data", description = "Word or PowerPoint document"),
    responses(
        (status = 200, description = "Converted PDF stream (application/pdf)"),
        (status = 400, description = "Missing or invalid upload", body = ErrorResponse),
        (status = 429, description = "Converter capacity exhausted", body = ErrorResponse),
        (status = 500, description = "Conversion failed", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn office_to_pdf(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    reject_oversized(&headers, state.config.max_body_size())?;
    let mut multipart = multipart.map_err(multipart_rejection)?;

    let mut scratch = ScratchFiles::new(request_label(&headers));
    let upload = receive_upload(&state, &mut multipart, &mut scratch)
        .await?
        .ok_or_else(|| AppError::BadRequest(NO_FILE_UPLOADED.to_string()))?;

    let document = state.conversions.convert(upload, scratch).await?;
    Ok(document.into_response())
}

/// Rejects bodies whose declared length is already over the limit, before
/// anything touches the disk.
fn reject_oversized(headers: &HeaderMap, max_body_size: usize) -> Result<(), AppError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(len) if len > max_body_size as u64 => {
            tracing::warn!("Rejected upload of {} bytes (limit {})", len, max_body_size);
            Err(AppError::BadRequest(FILE_TOO_LARGE.to_string()))
        }
        _ => Ok(()),
    }
}

/// A request that is not `multipart/form-data` at all carries no file part.
fn multipart_rejection(rejection: MultipartRejection) -> AppError {
    match rejection {
        MultipartRejection::InvalidBoundary(_) => {
            tracing::debug!("Non-multipart upload: {}", rejection.body_text());
            AppError::BadRequest(NO_FILE_UPLOADED.to_string())
        }
        other => AppError::BadRequest(other.body_text()),
    }
}

fn request_label(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Stores the single `file` part. Non-file fields are ignored; a file under
/// another name or a second `file` part is an error.
async fn receive_upload(
    state: &AppState,
    multipart: &mut Multipart,
    scratch: &mut ScratchFiles,
) -> Result<Option<UploadedFile>, AppError> {
    let mut upload: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::BadRequest(FILE_TOO_LARGE.to_string())
        } else {
            AppError::BadRequest(e.body_text())
        }
    })? {
        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if field.name() != Some(FILE_FIELD) || upload.is_some() {
            tracing::warn!(
                "Unexpected file part {:?} ({:?})",
                field.name(),
                original_name
            );
            return Err(AppError::BadRequest(UNEXPECTED_FIELD.to_string()));
        }

        let content_type = field.content_type().map(str::to_string);
        let reader = StreamReader::new(field.map_err(std::io::Error::other));

        upload = Some(
            state
                .conversions
                .storage()
                .store_upload(
                    &original_name,
                    content_type,
                    reader,
                    state.config.max_file_size,
                    scratch,
                )
                .await?,
        );
    }

    Ok(upload)
}
