#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{EncryptingStorage, ObjectCipher, Storage, StorageError, StorageResult};
use casefile_core::config::StorageBackendKind;
use casefile_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration.
///
/// When `ENCRYPTION_KEY` is configured the backend is wrapped so payloads
/// are encrypted at rest and upload results carry the envelope parameters.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let backend: Arc<dyn Storage> = match config.storage_backend {
        #[cfg(feature = "storage-s3")]
        StorageBackendKind::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config
                .s3_region
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_REGION not configured".to_string()))?;
            let endpoint = config.s3_endpoint.clone();

            Arc::new(S3Storage::new(bucket, region, endpoint).await?)
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackendKind::S3 => {
            return Err(StorageError::ConfigError(
                "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-local")]
        StorageBackendKind::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config.local_storage_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;

            Arc::new(LocalStorage::new(base_path, base_url).await?)
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackendKind::Local => {
            return Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }
    };

    match config.encryption_key {
        Some(ref key) => {
            let cipher = ObjectCipher::from_base64_key(key)?;
            tracing::info!("At-rest encryption enabled for object storage");
            Ok(Arc::new(EncryptingStorage::new(backend, cipher)))
        }
        None => Ok(backend),
    }
}
