use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use utoipa::ToSchema;

/// An upload that has been written to the upload directory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename as sent by the client (untrusted)
    pub original_name: String,
    /// Location inside the upload directory
    pub path: PathBuf,
    pub size: u64,
    /// Content type as sent by the client (unvalidated)
    pub content_type: Option<String>,
}

/// Lifecycle of a single conversion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Validated,
    Converting,
    Converted,
    Streaming,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Received => "received",
            JobState::Validated => "validated",
            JobState::Converting => "converting",
            JobState::Converted => "converted",
            JobState::Streaming => "streaming",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-request conversion bookkeeping. Never shared between requests.
#[derive(Debug)]
pub struct ConversionJob {
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub output_exists: bool,
}

impl ConversionJob {
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), input_path, output_path)
    }

    /// For callers that need the id before the output path is known
    pub fn with_id(id: String, input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id,
            input_path,
            output_path,
            state: JobState::Received,
            exit_code: None,
            output_exists: false,
        }
    }

    /// Moves the job forward. `Failed` and `Done` are terminal.
    pub fn advance(&mut self, next: JobState) {
        if matches!(self.state, JobState::Failed | JobState::Done) {
            tracing::warn!(
                job_id = %self.id,
                "Ignoring transition {} -> {} on finished job",
                self.state,
                next
            );
            return;
        }
        tracing::debug!(job_id = %self.id, from = %self.state, to = %next, "job state change");
        self.state = next;
    }

    pub fn fail(&mut self) {
        self.advance(JobState::Failed);
    }

    /// Name offered to the client for the produced PDF
    pub fn pdf_name(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Multipart form accepted by the conversion endpoint
#[derive(Debug, ToSchema)]
pub struct OfficeUpload {
    /// Word or PowerPoint document
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
