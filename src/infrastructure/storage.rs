use crate::config::AppConfig;
use crate::services::storage::TempStorage;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> std::io::Result<Arc<TempStorage>> {
    let storage = TempStorage::new(config.upload_dir.clone(), config.output_dir.clone());
    storage.ensure_dirs().await?;

    info!(
        "📁 Scratch directories: uploads={} output={}",
        storage.upload_dir().display(),
        storage.output_dir().display()
    );

    Ok(Arc::new(storage))
}
