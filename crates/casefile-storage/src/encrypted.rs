//! Encrypting decorator over any storage backend.

use std::sync::Arc;

use async_trait::async_trait;
use casefile_core::config::StorageBackendKind;

use crate::crypto::ObjectCipher;
use crate::traits::{Storage, StorageResult, StoredObject};

/// Wraps a backend so every object is encrypted before it leaves the
/// process and decrypted on the way back. Upload results carry the
/// envelope parameters for the caller to record in the file's metadata.
pub struct EncryptingStorage {
    inner: Arc<dyn Storage>,
    cipher: ObjectCipher,
}

impl EncryptingStorage {
    pub fn new(inner: Arc<dyn Storage>, cipher: ObjectCipher) -> Self {
        Self { inner, cipher }
    }
}

#[async_trait]
impl Storage for EncryptingStorage {
    async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<StoredObject> {
        let encrypted = self.cipher.encrypt(&data)?;
        let mut stored = self.inner.upload(filename, content_type, encrypted).await?;
        stored.encryption = Some(self.cipher.metadata());
        Ok(stored)
    }

    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        let encrypted = self.cipher.encrypt(&data)?;
        self.inner
            .upload_with_key(storage_key, encrypted, content_type)
            .await
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let data = self.inner.download(storage_key).await?;
        self.cipher.decrypt(&data)
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.inner.delete(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    fn backend_type(&self) -> StorageBackendKind {
        self.inner.backend_type()
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::local::LocalStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn blob_on_disk_is_not_plaintext() {
        let dir = TempDir::new().unwrap();
        let local = LocalStorage::new(dir.path(), "http://localhost/files".to_string())
            .await
            .unwrap();
        let storage = EncryptingStorage::new(
            Arc::new(local.clone()),
            ObjectCipher::from_key_bytes(&[9u8; 32]).unwrap(),
        );

        let stored = storage
            .upload("secret.txt", "text/plain", b"case notes".to_vec())
            .await
            .unwrap();
        assert!(stored.encryption.is_some());

        // Raw backend sees ciphertext, decorator round-trips plaintext.
        let raw = local.download(&stored.key).await.unwrap();
        assert_ne!(raw, b"case notes");
        assert_eq!(storage.download(&stored.key).await.unwrap(), b"case notes");
    }
}
