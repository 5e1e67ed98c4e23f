use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Overall lifecycle status of an uploaded file.
///
/// `Rejected` and `Ready` are terminal; a file whose scan found malware can
/// never leave `Rejected`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Ready,
    Rejected,
    Error,
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Processing => write!(f, "processing"),
            FileStatus::Ready => write!(f, "ready"),
            FileStatus::Rejected => write!(f, "rejected"),
            FileStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "processing" => Ok(FileStatus::Processing),
            "ready" => Ok(FileStatus::Ready),
            "rejected" => Ok(FileStatus::Rejected),
            "error" => Ok(FileStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

/// Malware-scan status. `Clean` and `Infected` are authoritative verdicts;
/// `Error` means the file was never checked and must not be treated as clean.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Scanning,
    Clean,
    Infected,
    Error,
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ScanStatus::Pending => write!(f, "pending"),
            ScanStatus::Scanning => write!(f, "scanning"),
            ScanStatus::Clean => write!(f, "clean"),
            ScanStatus::Infected => write!(f, "infected"),
            ScanStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for ScanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "scanning" => Ok(ScanStatus::Scanning),
            "clean" => Ok(ScanStatus::Clean),
            "infected" => Ok(ScanStatus::Infected),
            "error" => Ok(ScanStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid scan status: {}", s)),
        }
    }
}

impl ScanStatus {
    /// A verdict is authoritative once the scanner actually examined the
    /// bytes, regardless of outcome.
    pub fn is_verdict(&self) -> bool {
        matches!(self, ScanStatus::Clean | ScanStatus::Infected)
    }
}

/// Sanitization sub-state. Only leaves `None` after a `clean` verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SanitizeStatus {
    None,
    Sanitizing,
    Safe,
    Failed,
}

impl Display for SanitizeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SanitizeStatus::None => write!(f, "none"),
            SanitizeStatus::Sanitizing => write!(f, "sanitizing"),
            SanitizeStatus::Safe => write!(f, "safe"),
            SanitizeStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for SanitizeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SanitizeStatus::None),
            "sanitizing" => Ok(SanitizeStatus::Sanitizing),
            "safe" => Ok(SanitizeStatus::Safe),
            "failed" => Ok(SanitizeStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid sanitize status: {}", s)),
        }
    }
}

/// A file uploaded into the case-management system.
///
/// Created in `pending` after the object-store write succeeded; mutated only
/// by the scan worker as it advances through states. Ownership by a case
/// record / step note / situation fact lives in the business layer and is
/// not modeled here; that layer also owns deletion of the blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CaseFile {
    pub id: Uuid,
    pub original_filename: String,
    pub sanitized_filename: String,
    /// Detected content type; the client-declared type is never stored.
    pub content_type: String,
    pub file_size: i64,
    pub storage_key: String,
    pub storage_url: String,
    /// Arbitrary metadata; carries encryption parameters when at-rest
    /// encryption is enabled.
    pub metadata: serde_json::Value,
    pub status: FileStatus,
    pub scan_status: ScanStatus,
    pub sanitize_status: SanitizeStatus,
    pub detected_threats: Vec<String>,
    pub processing_error: Option<String>,
    /// Set only once sanitization succeeded (`sanitize_status = safe`).
    pub safe_storage_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseFile {
    /// Whether any consumer may hand this file out for download.
    pub fn is_available(&self) -> bool {
        self.status == FileStatus::Ready && self.scan_status != ScanStatus::Infected
    }
}

/// API representation of a file and its processing state.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileResponse {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub status: FileStatus,
    pub scan_status: ScanStatus,
    pub sanitize_status: SanitizeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CaseFile> for FileResponse {
    fn from(file: CaseFile) -> Self {
        FileResponse {
            id: file.id,
            filename: file.sanitized_filename,
            content_type: file.content_type,
            file_size: file.file_size,
            status: file.status,
            scan_status: file.scan_status,
            sanitize_status: file.sanitize_status,
            processing_error: file.processing_error,
            safe_path: file.safe_storage_key,
            created_at: file.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_file(status: FileStatus, scan_status: ScanStatus) -> CaseFile {
        CaseFile {
            id: Uuid::new_v4(),
            original_filename: "report.pdf".to_string(),
            sanitized_filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            file_size: 2048,
            storage_key: "files/abc.pdf".to_string(),
            storage_url: "http://localhost:4000/files/abc.pdf".to_string(),
            metadata: serde_json::json!({}),
            status,
            scan_status,
            sanitize_status: SanitizeStatus::None,
            detected_threats: vec![],
            processing_error: None,
            safe_storage_key: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn infected_file_is_never_available() {
        let file = test_file(FileStatus::Rejected, ScanStatus::Infected);
        assert!(!file.is_available());
    }

    #[test]
    fn ready_clean_file_is_available() {
        let file = test_file(FileStatus::Ready, ScanStatus::Clean);
        assert!(file.is_available());
    }

    #[test]
    fn pending_file_is_not_available() {
        let file = test_file(FileStatus::Pending, ScanStatus::Pending);
        assert!(!file.is_available());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            FileStatus::Pending,
            FileStatus::Processing,
            FileStatus::Ready,
            FileStatus::Rejected,
            FileStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<FileStatus>().unwrap(), status);
        }
        for status in [
            ScanStatus::Pending,
            ScanStatus::Scanning,
            ScanStatus::Clean,
            ScanStatus::Infected,
            ScanStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<ScanStatus>().unwrap(), status);
        }
    }

    #[test]
    fn only_clean_and_infected_are_verdicts() {
        assert!(ScanStatus::Clean.is_verdict());
        assert!(ScanStatus::Infected.is_verdict());
        assert!(!ScanStatus::Error.is_verdict());
        assert!(!ScanStatus::Scanning.is_verdict());
    }

    #[test]
    fn file_response_uses_sanitized_name() {
        let mut file = test_file(FileStatus::Ready, ScanStatus::Clean);
        file.original_filename = "my report (final).pdf".to_string();
        file.sanitized_filename = "my_report_final.pdf".to_string();

        let response = FileResponse::from(file);
        assert_eq!(response.filename, "my_report_final.pdf");
    }
}
