//! Upload pipeline: extract → validate → store → persist → enqueue.
//!
//! Validation happens before anything is written, so a rejected upload
//! leaves no trace. The object-store write comes first; if the
//! record-plus-job persist step fails afterwards, the blob is rolled back
//! before the original error propagates, because the object store and the
//! metadata store are not transactionally joined.

use std::sync::Arc;

use axum::extract::Multipart;
use casefile_core::models::CaseFile;
use casefile_core::validation::validate_upload;
use casefile_core::AppError;
use casefile_db::CreateFileParams;
use casefile_storage::storage_filename;
use uuid::Uuid;

use crate::state::AppState;

pub struct FileUploadService {
    state: Arc<AppState>,
}

impl FileUploadService {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            state: state.clone(),
        }
    }

    /// Run the full synchronous half of the ingestion pipeline. Scanning
    /// happens asynchronously once the returned file's job is claimed.
    pub async fn upload(&self, multipart: Multipart) -> Result<CaseFile, AppError> {
        let (data, declared_name, declared_content_type) =
            extract_multipart_file(multipart).await?;

        let validated = validate_upload(
            &data,
            &declared_name,
            declared_content_type.as_deref(),
            self.state.config.max_file_size_bytes,
        )?;

        let file_id = Uuid::new_v4();
        let filename = storage_filename(file_id, &validated.extension);
        let file_size = data.len() as i64;

        tracing::info!(
            file_id = %file_id,
            original_filename = %declared_name,
            sanitized_filename = %validated.sanitized_filename,
            content_type = %validated.content_type,
            file_size = file_size,
            "Processing upload"
        );

        let stored = self
            .state
            .storage
            .upload(&filename, &validated.content_type, data)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, file_id = %file_id, "Failed to upload to storage");
                AppError::from(e)
            })?;

        let metadata = match stored.encryption {
            Some(ref params) => serde_json::json!({ "encryption": params }),
            None => serde_json::json!({}),
        };

        let params = CreateFileParams {
            id: file_id,
            original_filename: declared_name,
            sanitized_filename: validated.sanitized_filename,
            content_type: validated.content_type,
            file_size,
            storage_key: stored.key.clone(),
            storage_url: stored.url,
            metadata,
        };

        match self.state.files.create_with_scan_job(params).await {
            Ok((file, job)) => {
                tracing::info!(
                    file_id = %file.id,
                    job_id = %job.id,
                    storage_key = %file.storage_key,
                    "Upload persisted and scan job enqueued"
                );
                Ok(file)
            }
            Err(e) => {
                // The blob landed but the record did not: roll the write
                // back before surfacing the original error. A failed
                // rollback is logged, never allowed to mask it.
                if let Err(cleanup_err) = self.state.storage.delete(&stored.key).await {
                    tracing::warn!(
                        error = %cleanup_err,
                        storage_key = %stored.key,
                        "Failed to roll back storage object after persist error"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Extract file data, filename, and content type from multipart form.
/// Only one field named "file" is accepted; multiple file fields are rejected.
pub async fn extract_multipart_file(
    mut multipart: Multipart,
) -> Result<(Vec<u8>, String, Option<String>), AppError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        if field_name == "file" {
            if file_data.is_some() {
                return Err(AppError::InvalidInput(
                    "Multiple file fields are not allowed; send exactly one field named 'file'"
                        .to_string(),
                ));
            }
            filename = field.file_name().map(|s: &str| s.to_string());
            content_type = field.content_type().map(|s: &str| s.to_string());

            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidInput(format!("Failed to read file data: {}", e)))?;

            file_data = Some(data.to_vec());
        }
    }

    let file_data =
        file_data.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;

    let original_filename = filename.unwrap_or_else(|| "unknown".to_string());

    Ok((file_data, original_filename, content_type))
}
