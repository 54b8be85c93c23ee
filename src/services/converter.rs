use crate::services::storage::pdf_file_name;
use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// How long a failed converter's stderr is waited for after it exits
const STDERR_GRACE: Duration = Duration::from_secs(2);
/// Upper bound for the `--version` probe used by health checks
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Keep logged stderr excerpts short
const STDERR_EXCERPT_LEN: usize = 2048;
/// Per-job LibreOffice user profile, created by soffice inside the job's output directory
pub const PROFILE_DIR_NAME: &str = "lo-profile";

/// Characters escaped in the path part of a `file://` URL
const FILE_URL_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to start converter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter exited with {status}: {stderr}")]
    Process { status: ExitStatus, stderr: String },

    #[error("converter reported success but {} was not produced", .0.display())]
    OutputMissing(PathBuf),

    #[error("converter did not finish within {0:?} and was killed")]
    Timeout(Duration),

    #[error("converted output could not be read: {0}")]
    OutputUnreadable(#[source] std::io::Error),
}

impl ConversionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::Spawn { .. } => "spawn",
            ConversionError::Process { .. } => "process",
            ConversionError::OutputMissing(_) => "output_missing",
            ConversionError::Timeout(_) => "timeout",
            ConversionError::OutputUnreadable(_) => "output_unreadable",
        }
    }
}

/// Trait for document-to-PDF conversion backends
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Converts `input` to `<output_dir>/<input stem>.pdf`.
    ///
    /// `output_dir` belongs to this call alone and may receive other scratch
    /// state besides the PDF. Succeeds only when the converter exits cleanly
    /// and the PDF exists.
    async fn convert(&self, input: &Path, output_dir: &Path) -> Result<(), ConversionError>;

    /// Check if the converter is available/healthy
    async fn health_check(&self) -> bool;
}

/// LibreOffice (`soffice`) running in headless batch mode.
pub struct SofficeConverter {
    program: String,
    timeout: Option<Duration>,
}

impl SofficeConverter {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `profile_url` isolates the instance: soffice runs one process per user
    /// profile and hands work to an already running one otherwise.
    fn command(&self, input: &Path, output_dir: &Path, profile_url: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(format!("-env:UserInstallation={}", profile_url))
            .arg("--headless")
            .arg("--nologo")
            .arg("--nofirststartwizard")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(output_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Dropping the request future must not orphan the converter
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn convert(&self, input: &Path, output_dir: &Path) -> Result<(), ConversionError> {
        let expected = output_dir.join(pdf_file_name(input));
        let spawn_error = |source: std::io::Error| ConversionError::Spawn {
            program: self.program.clone(),
            source,
        };

        let profile = profile_url(&output_dir.join(PROFILE_DIR_NAME)).map_err(spawn_error)?;
        let mut child = self
            .command(input, output_dir, &profile)
            .spawn()
            .map_err(spawn_error)?;

        tracing::debug!(
            pid = ?child.id(),
            "Started converter for {}",
            input.display()
        );

        // Drained on its own task so a chatty converter can never block on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await,
            None => Ok(child.wait().await),
        };

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                // The wait itself failed; make sure the process does not outlive us
                let _ = child.kill().await;
                return Err(ConversionError::Spawn {
                    program: self.program.clone(),
                    source: e,
                });
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill timed out converter: {}", e);
                }
                let limit = self.timeout.unwrap_or_default();
                return Err(ConversionError::Timeout(limit));
            }
        };

        if !status.success() {
            let stderr = match stderr_task {
                Some(task) => match tokio::time::timeout(STDERR_GRACE, task).await {
                    Ok(Ok(bytes)) => stderr_excerpt(&bytes),
                    _ => String::new(),
                },
                None => String::new(),
            };
            return Err(ConversionError::Process { status, stderr });
        }

        match tokio::fs::try_exists(&expected).await {
            Ok(true) => Ok(()),
            _ => Err(ConversionError::OutputMissing(expected)),
        }
    }

    async fn health_check(&self) -> bool {
        let mut probe = Command::new(&self.program);
        probe
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, probe.status()).await,
            Ok(Ok(status)) if status.success()
        )
    }
}

/// `file:///abs/path` form soffice expects for `-env:UserInstallation`
fn profile_url(dir: &Path) -> std::io::Result<String> {
    let absolute = std::path::absolute(dir)?;
    let mut path = absolute.to_string_lossy().replace('\\', "/");
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    Ok(format!("file://{}", utf8_percent_encode(&path, FILE_URL_PATH)))
}

fn stderr_excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let mut end = text.len().min(STDERR_EXCERPT_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Factory function to create the converter described by the config
pub fn create_converter(config: &crate::config::AppConfig) -> Box<dyn DocumentConverter> {
    Box::new(SofficeConverter::new(
        config.converter_path.clone(),
        config.conversion_timeout(),
    ))
}
