#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
};
use http_body_util::BodyExt;
use office_pdf_backend::config::AppConfig;
use office_pdf_backend::infrastructure::storage::setup_storage;
use office_pdf_backend::services::conversion_service::ConversionService;
use office_pdf_backend::services::converter::{DocumentConverter, SofficeConverter};
use office_pdf_backend::services::limiter::ConversionLimiter;
use office_pdf_backend::{AppState, create_app};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Honors the soffice invocation template: writes `%PDF-1.4` plus the input
/// bytes to `<outdir>/<stem>.pdf`.
pub const ECHO_CONVERTER: &str = r#"#!/bin/sh
outdir=""
input=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    --convert-to) shift 2 ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
name=$(basename "$input")
stem="${name%.*}"
{ printf '%%PDF-1.4\n'; cat "$input"; } > "$outdir/$stem.pdf"
"#;

/// Writes the `-env:UserInstallation` value it was given as the PDF body, and
/// creates that profile directory the way soffice would.
pub const PROFILE_RECORDING_CONVERTER: &str = r#"#!/bin/sh
outdir=""
input=""
profile=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    -env:UserInstallation=*) profile="${1#-env:UserInstallation=}"; shift ;;
    --outdir) outdir="$2"; shift 2 ;;
    --convert-to) shift 2 ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
mkdir -p "$outdir/lo-profile/user"
name=$(basename "$input")
stem="${name%.*}"
printf '%s' "$profile" > "$outdir/$stem.pdf"
"#;

pub const FAILING_CONVERTER: &str = "#!/bin/sh\necho 'Error: source file could not be loaded' >&2\nexit 3\n";

pub const SILENT_CONVERTER: &str = "#!/bin/sh\nexit 0\n";

pub const HANGING_CONVERTER: &str = "#!/bin/sh\nexec sleep 30\n";

pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(filename: &'a str, content: &'a [u8]) -> Self {
        Self {
            name: "file",
            filename: Some(filename),
            content,
        }
    }

    pub fn text(name: &'a str, content: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content: content.as_bytes(),
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/vnd.openxmlformats-officedocument.wordprocessingml.document\r\n\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    let body = multipart_body(parts);
    Request::builder()
        .method("POST")
        .uri("/api/office-to-pdf")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("Content-Length", body.len())
        .body(Body::from(body))
        .unwrap()
}

pub async fn read_response(
    response: axum::response::Response,
) -> (StatusCode, HeaderMap, Bytes) {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

pub fn error_message(body: &[u8]) -> String {
    let json: serde_json::Value = serde_json::from_slice(body).unwrap();
    json["error"].as_str().unwrap().to_string()
}

pub fn test_config(root: &Path) -> AppConfig {
    let _ = tracing_subscriber::fmt::try_init();
    AppConfig {
        upload_dir: root.join("uploads"),
        output_dir: root.join("output"),
        max_concurrent_conversions: 4,
        conversion_queue_wait_secs: 30,
        conversion_timeout_secs: 10,
        ..AppConfig::default()
    }
}

pub async fn app_with_converter(config: &AppConfig, converter: Arc<dyn DocumentConverter>) -> Router {
    let storage = setup_storage(config).await.unwrap();
    let state = AppState {
        config: config.clone(),
        conversions: Arc::new(ConversionService::new(
            storage,
            converter,
            ConversionLimiter::from_config(config),
        )),
    };
    create_app(state)
}

pub async fn app_with_soffice(config: &AppConfig) -> Router {
    let converter = Arc::new(SofficeConverter::new(
        config.converter_path.clone(),
        config.conversion_timeout(),
    ));
    app_with_converter(config, converter).await
}

/// Writes an executable stub converter script into `dir`.
#[cfg(unix)]
pub fn stub_converter(dir: &TempDir, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

pub fn assert_scratch_empty(config: &AppConfig) {
    assert_eq!(file_count(&config.upload_dir), 0, "upload dir not empty");
    assert_eq!(file_count(&config.output_dir), 0, "output dir not empty");
}
