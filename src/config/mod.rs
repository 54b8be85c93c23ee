use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default converter executable for the current platform
#[cfg(target_os = "windows")]
pub const DEFAULT_CONVERTER_PATH: &str = "C:\\Program Files\\LibreOffice\\program\\soffice.exe";
#[cfg(target_os = "macos")]
pub const DEFAULT_CONVERTER_PATH: &str = "/Applications/LibreOffice.app/Contents/MacOS/soffice";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_CONVERTER_PATH: &str = "soffice";

/// Extra room allowed on top of `max_file_size` for multipart boundaries and part headers
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("converter path must not be empty")]
    EmptyConverterPath,

    #[error("max file size must be greater than zero")]
    ZeroMaxFileSize,

    #[error("upload and output directories must differ (both are {0})")]
    SharedDirectories(PathBuf),
}

/// Service configuration, passed explicitly to every component
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listening port (default: 5000)
    pub port: u16,

    /// Directory receiving uploaded documents (default: "uploads")
    pub upload_dir: PathBuf,

    /// Directory receiving converted PDFs (default: "output")
    pub output_dir: PathBuf,

    /// Converter executable (default: platform-dependent soffice location)
    pub converter_path: String,

    /// Maximum accepted upload size in bytes (default: 50 MB)
    pub max_file_size: usize,

    /// Maximum converter processes running at once, 0 disables the limit
    /// (default: number of CPUs)
    pub max_concurrent_conversions: usize,

    /// How long a request may wait for a free conversion slot (default: 60s)
    pub conversion_queue_wait_secs: u64,

    /// Converter wall-clock limit, 0 disables the timeout (default: 300s)
    pub conversion_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            converter_path: DEFAULT_CONVERTER_PATH.to_string(),
            max_file_size: 50 * 1024 * 1024, // 50 MB
            max_concurrent_conversions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            conversion_queue_wait_secs: 60,
            conversion_timeout_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to
    /// defaults for missing or unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            upload_dir: lookup("UPLOAD_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            output_dir: lookup("OUTPUT_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.output_dir),

            converter_path: lookup("SOFFICE_PATH")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default.converter_path),

            max_file_size: lookup("MAX_FILE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_concurrent_conversions: lookup("MAX_CONCURRENT_CONVERSIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_concurrent_conversions),

            conversion_queue_wait_secs: lookup("CONVERSION_QUEUE_WAIT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.conversion_queue_wait_secs),

            conversion_timeout_secs: lookup("CONVERSION_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.conversion_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.converter_path.trim().is_empty() {
            return Err(ConfigError::EmptyConverterPath);
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::ZeroMaxFileSize);
        }
        if self.upload_dir == self.output_dir {
            return Err(ConfigError::SharedDirectories(self.upload_dir.clone()));
        }
        Ok(())
    }

    pub fn conversion_timeout(&self) -> Option<Duration> {
        (self.conversion_timeout_secs > 0).then(|| Duration::from_secs(self.conversion_timeout_secs))
    }

    /// Largest request body accepted for an upload, including multipart framing
    pub fn max_body_size(&self) -> usize {
        self.max_file_size.saturating_add(MULTIPART_OVERHEAD)
    }
}
