//! Casefile storage layer
//!
//! Storage abstraction and backends for uploaded case files. The `Storage`
//! trait is the object-store adapter the ingestion pipeline writes through;
//! `LocalStorage` and `S3Storage` implement it, and `EncryptingStorage`
//! wraps any backend with AES-256-GCM at-rest encryption.
//!
//! # Storage key format
//!
//! Keys are generated centrally in the `keys` module: `files/{uuid}.{ext}`
//! for originals and `files/safe/{uuid}.{ext}` for sanitized copies. Keys
//! must not contain `..` or a leading `/`.
//!
//! # Rollback contract
//!
//! `delete` is idempotent: deleting a missing object succeeds. A caller
//! that wrote a blob and then fails a downstream step must call `delete`
//! on the returned key before surfacing the original error; a failed
//! delete is logged and never masks that error.

pub mod crypto;
pub mod encrypted;
pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use crypto::ObjectCipher;
pub use encrypted::EncryptingStorage;
pub use factory::create_storage;
pub use keys::{safe_storage_key, storage_filename};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult, StoredObject};
