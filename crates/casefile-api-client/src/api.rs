//! Domain methods for the Casefile API client.
//!
//! Response types are re-exported from `casefile_core::models`.

use anyhow::{Context, Result};
use casefile_core::models::{FailureRecord, FileResponse, KindCount};
use uuid::Uuid;

use crate::{api_prefix, ApiClient};

impl ApiClient {
    /// Upload a file from a local path.
    pub async fn upload_file(&self, file_path: &str) -> Result<FileResponse> {
        use std::io::Read;

        let path = std::path::Path::new(file_path);
        if path
            .components()
            .any(|c| c == std::path::Component::ParentDir)
        {
            return Err(anyhow::anyhow!("Invalid input: {}", path.display()));
        }
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open file: {}", file_path))?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read file: {}", file_path))?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin");

        self.upload_bytes(buffer, filename).await
    }

    /// Upload raw bytes under a declared filename.
    pub async fn upload_bytes(&self, data: Vec<u8>, filename: &str) -> Result<FileResponse> {
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(data).file_name(filename.to_string()),
        );

        self.post_multipart(&format!("{}/files", api_prefix()), form)
            .await
    }

    /// Fetch a file's current processing status.
    pub async fn get_status(&self, file_id: Uuid) -> Result<FileResponse> {
        self.get(&format!("{}/files/{}", api_prefix(), file_id), &[])
            .await
    }

    /// Unresolved failures for a feed, in retry order.
    pub async fn list_failures(&self, feed: &str, limit: i64) -> Result<Vec<FailureRecord>> {
        self.get(
            &format!("{}/failures/{}", api_prefix(), feed),
            &[("limit", limit.to_string())],
        )
        .await
    }

    /// Unresolved failure counts by error kind for a feed.
    pub async fn count_failures(&self, feed: &str) -> Result<Vec<KindCount>> {
        self.get(&format!("{}/failures/{}/counts", api_prefix(), feed), &[])
            .await
    }

    /// Subject ids with unresolved failures for a feed.
    pub async fn list_failure_subjects(&self, feed: &str) -> Result<Vec<String>> {
        self.get(&format!("{}/failures/{}/subjects", api_prefix(), feed), &[])
            .await
    }
}
