use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::file::{CaseFile, FileStatus, SanitizeStatus, ScanStatus};

/// Status-change event pushed to subscribers after every state transition.
///
/// The payload always carries the full status tuple so a late subscriber
/// can reconstruct the current state from any single event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileStatusEvent {
    pub file_id: Uuid,
    pub status: FileStatus,
    pub scan_status: ScanStatus,
    pub sanitize_status: SanitizeStatus,
    pub processing_error: Option<String>,
    pub safe_path: Option<String>,
}

impl From<&CaseFile> for FileStatusEvent {
    fn from(file: &CaseFile) -> Self {
        FileStatusEvent {
            file_id: file.id,
            status: file.status,
            scan_status: file.scan_status,
            sanitize_status: file.sanitize_status,
            processing_error: file.processing_error.clone(),
            safe_path: file.safe_storage_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn event_carries_the_full_status_tuple() {
        let file = CaseFile {
            id: Uuid::new_v4(),
            original_filename: "scan.pdf".to_string(),
            sanitized_filename: "scan.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            file_size: 100,
            storage_key: "files/x.pdf".to_string(),
            storage_url: "http://localhost/files/x.pdf".to_string(),
            metadata: serde_json::json!({}),
            status: FileStatus::Ready,
            scan_status: ScanStatus::Clean,
            sanitize_status: SanitizeStatus::Safe,
            detected_threats: vec![],
            processing_error: None,
            safe_storage_key: Some("files/safe/x.pdf".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let event = FileStatusEvent::from(&file);
        assert_eq!(event.file_id, file.id);
        assert_eq!(event.status, FileStatus::Ready);
        assert_eq!(event.scan_status, ScanStatus::Clean);
        assert_eq!(event.sanitize_status, SanitizeStatus::Safe);
        assert_eq!(event.safe_path.as_deref(), Some("files/safe/x.pdf"));
        assert!(event.processing_error.is_none());
    }
}
