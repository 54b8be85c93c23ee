use crate::models::UploadedFile;
use crate::utils::validation::{ValidationError, sanitize_filename};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(#[from] ValidationError),

    #[error("File too large (limit {limit} bytes)")]
    TooLarge { limit: usize },

    #[error("Scratch path already in use: {}", .0.display())]
    Collision(PathBuf),

    #[error("Upload stream failed: {0}")]
    Stream(std::io::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Allocates and reclaims scratch files under the upload and output directories.
#[derive(Debug, Clone)]
pub struct TempStorage {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl TempStorage {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Creates both scratch directories if they are missing. Idempotent.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// `<upload_dir>/<unix millis>_<sanitized name>`
    pub fn allocate_input_path(&self, original_name: &str) -> Result<PathBuf, ValidationError> {
        let safe_name = sanitize_filename(original_name)?;
        let stored_name = format!("{}_{}", Utc::now().timestamp_millis(), safe_name);
        Ok(self.upload_dir.join(stored_name))
    }

    /// `<output_dir>/<job_id>`, the converter's output directory for one job
    pub fn job_output_dir(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(job_id)
    }

    /// `<output_dir>/<job_id>/<stem>.pdf`. Two inputs sharing a stem never
    /// share an output, whatever their extension.
    pub fn derive_output_path(&self, job_id: &str, input_path: &Path) -> PathBuf {
        self.job_output_dir(job_id).join(pdf_file_name(input_path))
    }

    /// Creates the job's private output directory and hands it to `scratch`.
    pub async fn create_job_dir(
        &self,
        job_id: &str,
        scratch: &mut ScratchFiles,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.job_output_dir(job_id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::Collision(dir));
            }
            Err(e) => return Err(e.into()),
        }
        scratch.track_dir(dir.clone());
        Ok(dir)
    }

    /// Streams an upload into a freshly allocated input path.
    ///
    /// The path is registered with `scratch` as soon as the file exists, so a
    /// failure part-way through (oversize body, broken stream, full disk)
    /// still leaves nothing behind once the guard is dropped.
    pub async fn store_upload<R>(
        &self,
        original_name: &str,
        content_type: Option<String>,
        mut reader: R,
        max_size: usize,
        scratch: &mut ScratchFiles,
    ) -> Result<UploadedFile, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.allocate_input_path(original_name)?;
        let mut file = create_exclusive(&path).await?;
        scratch.track(path.clone());

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let mut size: u64 = 0;
        loop {
            let n = reader.read(&mut buffer).await.map_err(StorageError::Stream)?;
            if n == 0 {
                break;
            }
            size += n as u64;
            if size > max_size as u64 {
                return Err(StorageError::TooLarge { limit: max_size });
            }
            file.write_all(&buffer[..n]).await?;
        }
        file.flush().await?;

        tracing::debug!("Stored upload {:?} at {} ({} bytes)", original_name, path.display(), size);

        Ok(UploadedFile {
            original_name: original_name.to_string(),
            path,
            size,
            content_type,
        })
    }

    /// Best-effort removal. Failures are logged and counted, never raised.
    pub fn cleanup<P: AsRef<Path>>(paths: &[P]) -> usize {
        let mut failures = 0;
        for path in paths {
            let path = path.as_ref();
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("Removed scratch file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    failures += 1;
                    tracing::warn!("⚠️  Failed to remove scratch file {}: {}", path.display(), e);
                }
            }
        }
        failures
    }

    /// Best-effort recursive removal of per-job directories.
    pub fn cleanup_dirs<P: AsRef<Path>>(dirs: &[P]) -> usize {
        let mut failures = 0;
        for dir in dirs {
            let dir = dir.as_ref();
            match std::fs::remove_dir_all(dir) {
                Ok(()) => tracing::debug!("Removed scratch directory {}", dir.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    failures += 1;
                    tracing::warn!("⚠️  Failed to remove scratch directory {}: {}", dir.display(), e);
                }
            }
        }
        failures
    }
}

/// `<stem>.pdf`, the name the converter gives its output for `input_path`
pub fn pdf_file_name(input_path: &Path) -> String {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{}.pdf", stem)
}

async fn create_exclusive(path: &Path) -> Result<File, StorageError> {
    match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(StorageError::Collision(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Scratch files and directories owned by one request, removed exactly once
/// when dropped.
///
/// Removal runs inline on the dropping thread. It is a handful of unlinks in
/// local scratch directories, and it guarantees the files are gone by the time
/// the response body has been released.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    label: String,
    paths: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            paths: Vec::new(),
            dirs: Vec::new(),
        }
    }

    pub fn track(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Directories are removed recursively, after the tracked files.
    pub fn track_dir(&mut self, dir: PathBuf) {
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        if self.paths.is_empty() && self.dirs.is_empty() {
            return;
        }
        let failures = TempStorage::cleanup(&self.paths) + TempStorage::cleanup_dirs(&self.dirs);
        tracing::debug!(
            request = %self.label,
            files = self.paths.len(),
            dirs = self.dirs.len(),
            failures,
            "scratch files released"
        );
    }
}
