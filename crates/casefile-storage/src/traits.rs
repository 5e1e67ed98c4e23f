//! Storage abstraction trait
//!
//! All storage backends (S3, local filesystem) implement this trait, so the
//! upload path and the scan worker can work against any backend without
//! coupling to implementation details.

use async_trait::async_trait;
use casefile_core::config::StorageBackendKind;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for casefile_core::AppError {
    fn from(err: StorageError) -> Self {
        casefile_core::AppError::Storage(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A successfully stored object.
///
/// `key` doubles as the rollback handle: passing it to [`Storage::delete`]
/// undoes the write. `encryption` carries at-rest encryption parameters
/// when the backend is wrapped in [`crate::EncryptingStorage`], for the
/// caller to record in the file's metadata.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub encryption: Option<serde_json::Value>,
}

/// Storage abstraction trait
///
/// **Key format:** `files/{filename}`, centralized in the `keys` module so
/// all backends stay consistent.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload a file and return the stored object (key + public URL).
    ///
    /// `filename` is the unique generated name (`{uuid}.{ext}`); keys never
    /// collide across concurrent uploads because every upload generates a
    /// fresh UUID.
    async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<StoredObject>;

    /// Upload data to a specific storage key (for sanitized safe copies).
    /// Returns the public URL for the uploaded file.
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Download a file by its storage key
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a file by its storage key.
    ///
    /// Idempotent: deleting a key that does not exist succeeds, so the
    /// rollback path may call this even when the upload partially failed.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Check if a file exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackendKind;
}
