use crate::config::R2Config;
use crate::services::signer::Presigner;
use crate::services::storage::R2StorageService;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn setup_storage(
    config: R2Config,
    timeout: Duration,
) -> anyhow::Result<(Arc<Presigner>, Arc<R2StorageService>)> {
    match &config.endpoint {
        Some(endpoint) => info!(
            "☁️  R2 Storage: {} (Bucket: {}, path-style)",
            endpoint, config.bucket_name
        ),
        None => info!(
            "☁️  R2 Storage: account {} (Bucket: {})",
            config.account_id, config.bucket_name
        ),
    }

    let presigner = Arc::new(Presigner::new(config));
    let storage = Arc::new(R2StorageService::new(presigner.clone(), timeout)?);
    Ok((presigner, storage))
}
