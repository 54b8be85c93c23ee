use crate::config::AppConfig;
use crate::services::converter::DocumentConverter;
use std::sync::Arc;
use tracing::info;

pub async fn setup_converter(config: &AppConfig) -> Arc<dyn DocumentConverter> {
    let converter = crate::services::converter::create_converter(config);

    // Probe once so a missing install shows up in the startup log
    if converter.health_check().await {
        info!("📄 Converter ready: {}", config.converter_path);
    } else {
        tracing::warn!(
            "⚠️  Converter '{}' did not respond to --version! Conversions will fail until it is installed.",
            config.converter_path
        );
    }

    converter.into()
}
