use crate::api::error::AppError;
use crate::models::{ConversionJob, JobState, UploadedFile};
use crate::services::converter::{ConversionError, DocumentConverter};
use crate::services::limiter::ConversionLimiter;
use crate::services::storage::{ScratchFiles, TempStorage};
use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures::Stream;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Drives one upload through conversion. Holds no per-request state, so a
/// single instance serves every concurrent request.
pub struct ConversionService {
    storage: Arc<TempStorage>,
    converter: Arc<dyn DocumentConverter>,
    limiter: Option<Arc<ConversionLimiter>>,
}

impl ConversionService {
    pub fn new(
        storage: Arc<TempStorage>,
        converter: Arc<dyn DocumentConverter>,
        limiter: Option<ConversionLimiter>,
    ) -> Self {
        Self {
            storage,
            converter,
            limiter: limiter.map(Arc::new),
        }
    }

    pub fn storage(&self) -> &TempStorage {
        &self.storage
    }

    pub fn converter(&self) -> &Arc<dyn DocumentConverter> {
        &self.converter
    }

    /// Converts a stored upload and opens the resulting PDF for streaming.
    ///
    /// Each job converts into its own `<output_dir>/<job_id>` directory.
    /// Everything the job creates is owned by `scratch`: on error it is
    /// removed when `scratch` drops here, on success ownership moves into the
    /// returned document and removal waits until its response body is gone.
    pub async fn convert(
        &self,
        upload: UploadedFile,
        mut scratch: ScratchFiles,
    ) -> Result<ConvertedDocument, AppError> {
        let job_id = Uuid::new_v4().to_string();
        let job_dir = self.storage.create_job_dir(&job_id, &mut scratch).await?;
        let output_path = self.storage.derive_output_path(&job_id, &upload.path);
        scratch.track(output_path.clone());

        let mut job = ConversionJob::with_id(job_id, upload.path.clone(), output_path);
        job.advance(JobState::Validated);

        let started = Instant::now();
        match self.run(&mut job, &job_dir).await {
            Ok(file) => {
                let size = file.metadata().await.map(|m| m.len()).ok();
                tracing::info!(
                    job_id = %job.id,
                    "✅ Converted {:?} ({} bytes) to {} in {:?}",
                    upload.original_name,
                    upload.size,
                    job.pdf_name(),
                    started.elapsed()
                );
                job.advance(JobState::Streaming);
                Ok(ConvertedDocument {
                    file_name: job.pdf_name(),
                    file,
                    size,
                    completion: StreamCompletion {
                        job_id: job.id,
                        _scratch: scratch,
                    },
                })
            }
            Err(e) => {
                job.fail();
                tracing::debug!(
                    job_id = %job.id,
                    exit_code = ?job.exit_code,
                    output_exists = job.output_exists,
                    "conversion failed after {:?}",
                    started.elapsed()
                );
                Err(e)
            }
        }
    }

    async fn run(&self, job: &mut ConversionJob, job_dir: &Path) -> Result<File, AppError> {
        let permit = match &self.limiter {
            Some(limiter) => Some(limiter.acquire().await?),
            None => None,
        };

        job.advance(JobState::Converting);
        let result = self
            .converter
            .convert(&job.input_path, job_dir)
            .await;
        drop(permit);

        match result {
            Ok(()) => job.exit_code = Some(0),
            Err(e) => {
                if let ConversionError::Process { status, .. } = &e {
                    job.exit_code = status.code();
                }
                return Err(e.into());
            }
        }
        job.advance(JobState::Converted);

        // Checked again here, independent of what the converter claims
        job.output_exists = tokio::fs::try_exists(&job.output_path)
            .await
            .unwrap_or(false);
        if !job.output_exists {
            return Err(ConversionError::OutputMissing(job.output_path.clone()).into());
        }

        let file = File::open(&job.output_path)
            .await
            .map_err(ConversionError::OutputUnreadable)?;
        Ok(file)
    }
}

/// A finished PDF, ready to be streamed back to the client.
pub struct ConvertedDocument {
    pub file_name: String,
    file: File,
    size: Option<u64>,
    completion: StreamCompletion,
}

impl std::fmt::Debug for ConvertedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertedDocument")
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .field("job_id", &self.completion.job_id)
            .finish()
    }
}

impl IntoResponse for ConvertedDocument {
    fn into_response(self) -> Response {
        let disposition = HeaderValue::from_str(&content_disposition(&self.file_name))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

        let stream = CleanupStream {
            inner: ReaderStream::new(self.file),
            completion: self.completion,
        };

        let mut response = Body::from_stream(stream).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
        headers.insert(header::CONTENT_DISPOSITION, disposition);
        if let Some(size) = self.size {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        }
        response
    }
}

/// `attachment; filename="..."`, with an RFC 5987 `filename*` for non-ASCII names
pub fn content_disposition(file_name: &str) -> String {
    if file_name.is_ascii() {
        return format!("attachment; filename=\"{}\"", file_name);
    }

    let ascii_fallback: String = file_name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let ascii_fallback = if ascii_fallback.trim_matches(['_', '.']).is_empty() {
        "document.pdf".to_string()
    } else {
        ascii_fallback
    };
    let encoded = utf8_percent_encode(file_name, NON_ALPHANUMERIC);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback, encoded
    )
}

/// Marks the end of a request: dropping it logs completion and then removes
/// the request's scratch files.
struct StreamCompletion {
    job_id: String,
    _scratch: ScratchFiles,
}

impl Drop for StreamCompletion {
    fn drop(&mut self) {
        tracing::debug!(job_id = %self.job_id, to = %JobState::Done, "response stream closed");
    }
}

/// Body stream that owns the request's scratch files. Whether the body is
/// read to the end or abandoned by a dropped connection, the files go away
/// exactly once, when hyper drops the body.
struct CleanupStream {
    inner: ReaderStream<File>,
    completion: StreamCompletion,
}

impl Stream for CleanupStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(Some(Err(e))) = &polled {
            tracing::error!(job_id = %self.completion.job_id, "❌ PDF stream failed: {}", e);
        }
        polled
    }
}
