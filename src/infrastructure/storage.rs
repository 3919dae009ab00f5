use crate::config::ShareConfig;
use crate::services::registry::FileRegistry;
use tracing::info;

/// Make sure the storage directory exists and return a registry over it.
pub async fn setup_storage(config: &ShareConfig) -> anyhow::Result<FileRegistry> {
    let existed = config.storage_dir.is_dir();

    let registry = FileRegistry::open_or_create(&config.storage_dir)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Cannot prepare storage directory {}: {}",
                config.storage_dir.display(),
                e
            )
        })?;

    if existed {
        info!("📁 Storage directory {} is ready", registry.root().display());
    } else {
        info!("📁 Created storage directory {}", registry.root().display());
    }

    let file_count = registry.list().await.map(|files| files.len()).unwrap_or(0);
    info!("🗂️  {} stored file(s) found", file_count);

    Ok(registry)
}
