//! Per-file state machine: `pending → scanning → {clean | infected |
//! error}`, then `sanitizing → {safe | failed}` after a clean verdict.
//!
//! Every transition is persisted and then published to subscribers. An
//! unscannable file is never promoted to clean: scanner-not-configured,
//! connect failures, and timeouts all land in the `error` state, recorded
//! in the retry tracker for a later re-scan.

use std::sync::Arc;

use casefile_core::models::{CaseFile, ScanFailureKind, ScanJob};
use casefile_db::{FileRepository, RetryTracker, ScanJobRepository};
use casefile_notify::StatusNotifier;
use casefile_scanner::{ClamdClient, ClamdError, ScanVerdict};
use casefile_storage::{safe_storage_key, Storage};

use crate::sanitize::Sanitizer;

/// Operator-facing messages stored on the file record. Raw protocol and
/// internal error text goes to the failure tracker and logs instead.
const MSG_SCANNER_NOT_CONFIGURED: &str =
    "Malware scanning is not configured; the file has not been checked";
const MSG_SCAN_FAILED: &str = "Malware scan could not be completed; the file will be re-checked";
const MSG_STORAGE_READ_FAILED: &str = "Stored file could not be read back for scanning";
const MSG_INFECTED: &str = "Malware detected; the file has been blocked";
const MSG_SANITIZE_FAILED: &str = "File cleanup failed; the original upload is preserved";

/// Map a protocol error onto a failure kind for the tracker.
fn failure_kind_for(err: &ClamdError) -> ScanFailureKind {
    match err {
        ClamdError::Timeout { .. } => ScanFailureKind::ScanTimeout,
        ClamdError::Connect { .. } => ScanFailureKind::ScannerUnavailable,
        ClamdError::Io(_) | ClamdError::InvalidResponse(_) => ScanFailureKind::ScanProtocol,
    }
}

/// File extension for the safe-copy key, from the sanitized filename.
fn file_extension(file: &CaseFile) -> &str {
    file.sanitized_filename
        .rsplit('.')
        .next()
        .unwrap_or("bin")
}

pub struct ScanOrchestrator {
    files: FileRepository,
    jobs: ScanJobRepository,
    scan_failures: RetryTracker<ScanFailureKind>,
    storage: Arc<dyn Storage>,
    /// `None` when no scanner endpoint is configured. This static flag is
    /// the only gate on attempting a scan; live health-check results are
    /// deliberately not consulted.
    scanner: Option<ClamdClient>,
    sanitizer: Arc<dyn Sanitizer>,
    notifier: StatusNotifier,
}

impl ScanOrchestrator {
    pub fn new(
        files: FileRepository,
        jobs: ScanJobRepository,
        scan_failures: RetryTracker<ScanFailureKind>,
        storage: Arc<dyn Storage>,
        scanner: Option<ClamdClient>,
        sanitizer: Arc<dyn Sanitizer>,
        notifier: StatusNotifier,
    ) -> Self {
        Self {
            files,
            jobs,
            scan_failures,
            storage,
            scanner,
            sanitizer,
            notifier,
        }
    }

    async fn publish(&self, file: &CaseFile) {
        self.notifier.publish(file.into()).await;
    }

    /// Process one claimed job to completion. Errors returned here are
    /// infrastructure failures (database unreachable); pipeline failures
    /// are recorded on the file and in the tracker instead.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, file_id = %job.file_id))]
    pub async fn process_job(&self, job: &ScanJob) -> anyhow::Result<()> {
        let Some(file) = self.files.mark_scanning(job.file_id).await? else {
            tracing::warn!("File record deleted before scan; dropping job");
            self.jobs.mark_failed(job.id).await?;
            return Ok(());
        };
        self.publish(&file).await;

        let Some(scanner) = self.scanner.clone() else {
            self.fail_scan(
                job,
                ScanFailureKind::ScannerUnavailable,
                MSG_SCANNER_NOT_CONFIGURED,
                "scanner endpoint not configured",
            )
            .await?;
            return Ok(());
        };

        let data = match self.storage.download(&job.storage_key).await {
            Ok(data) => data,
            Err(e) => {
                self.fail_scan(
                    job,
                    ScanFailureKind::StorageRead,
                    MSG_STORAGE_READ_FAILED,
                    &e.to_string(),
                )
                .await?;
                return Ok(());
            }
        };

        match scanner.scan(&data, &job.filename).await {
            Ok(ScanVerdict::Clean) => {
                let Some(file) = self.files.record_scan_clean(job.file_id).await? else {
                    self.jobs.mark_failed(job.id).await?;
                    return Ok(());
                };
                self.publish(&file).await;

                self.sanitize(job, &file, data).await?;
            }
            Ok(ScanVerdict::Infected { threats }) => {
                let Some(file) = self
                    .files
                    .record_scan_infected(job.file_id, &threats, MSG_INFECTED)
                    .await?
                else {
                    self.jobs.mark_failed(job.id).await?;
                    return Ok(());
                };
                self.publish(&file).await;

                // A positive verdict is terminal and authoritative: the
                // scan attempt itself succeeded, so any open failure for
                // this file is resolved.
                self.resolve_scan_failure(job).await?;
                self.jobs.mark_completed(job.id).await?;
            }
            Err(e) => {
                self.fail_scan(job, failure_kind_for(&e), MSG_SCAN_FAILED, &e.to_string())
                    .await?;
            }
        }

        Ok(())
    }

    /// Sanitize a clean file and store the safe copy.
    async fn sanitize(&self, job: &ScanJob, file: &CaseFile, data: Vec<u8>) -> anyhow::Result<()> {
        let Some(file) = self.files.mark_sanitizing(file.id).await? else {
            self.jobs.mark_failed(job.id).await?;
            return Ok(());
        };
        self.publish(&file).await;

        let sanitized = match self.sanitizer.sanitize(data, &file.content_type).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail_sanitize(job, &e.to_string()).await?;
                return Ok(());
            }
        };

        let safe_key = safe_storage_key(file.id, file_extension(&file));
        if let Err(e) = self
            .storage
            .upload_with_key(&safe_key, sanitized, &file.content_type)
            .await
        {
            self.fail_sanitize(job, &e.to_string()).await?;
            return Ok(());
        }

        let Some(file) = self.files.record_sanitize_safe(file.id, &safe_key).await? else {
            self.jobs.mark_failed(job.id).await?;
            return Ok(());
        };
        self.publish(&file).await;

        self.resolve_scan_failure(job).await?;
        self.jobs.mark_completed(job.id).await?;

        tracing::info!(safe_key = %safe_key, "File sanitized and ready");
        Ok(())
    }

    /// Record a scan failure: error state on the file (human-readable
    /// message), detail into the tracker, job marked failed.
    async fn fail_scan(
        &self,
        job: &ScanJob,
        kind: ScanFailureKind,
        user_message: &str,
        detail: &str,
    ) -> anyhow::Result<()> {
        tracing::error!(kind = %kind, detail = %detail, "Scan attempt failed");

        if let Some(file) = self.files.record_scan_error(job.file_id, user_message).await? {
            self.publish(&file).await;
        }

        self.scan_failures
            .record_failure(
                &job.file_id.to_string(),
                kind,
                detail,
                serde_json::json!({
                    "job_id": job.id,
                    "attempts": job.attempts,
                    "storage_key": job.storage_key,
                }),
            )
            .await?;

        self.jobs.mark_failed(job.id).await?;
        Ok(())
    }

    async fn fail_sanitize(&self, job: &ScanJob, detail: &str) -> anyhow::Result<()> {
        tracing::error!(detail = %detail, "Sanitization failed");

        if let Some(file) = self
            .files
            .record_sanitize_failed(job.file_id, MSG_SANITIZE_FAILED)
            .await?
        {
            self.publish(&file).await;
        }

        self.scan_failures
            .record_failure(
                &job.file_id.to_string(),
                ScanFailureKind::Sanitize,
                detail,
                serde_json::json!({ "job_id": job.id }),
            )
            .await?;

        self.jobs.mark_failed(job.id).await?;
        Ok(())
    }

    async fn resolve_scan_failure(&self, job: &ScanJob) -> anyhow::Result<()> {
        let subject = job.file_id.to_string();
        let resolved = self
            .scan_failures
            .mark_resolved(&subject, Some(&subject))
            .await?;
        if resolved {
            tracing::info!("Previously failing file processed successfully");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn protocol_errors_map_to_failure_kinds() {
        let timeout = ClamdError::Timeout {
            operation: "scan",
            seconds: 60,
        };
        assert_eq!(failure_kind_for(&timeout), ScanFailureKind::ScanTimeout);

        let connect = ClamdError::Connect {
            address: "localhost:3310".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(
            failure_kind_for(&connect),
            ScanFailureKind::ScannerUnavailable
        );

        let invalid = ClamdError::InvalidResponse("garbage".to_string());
        assert_eq!(failure_kind_for(&invalid), ScanFailureKind::ScanProtocol);
    }

    #[test]
    fn safe_copy_extension_comes_from_sanitized_name() {
        let file = CaseFile {
            id: Uuid::new_v4(),
            original_filename: "photo.jpeg".to_string(),
            sanitized_filename: "photo.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            file_size: 10,
            storage_key: "files/x.jpg".to_string(),
            storage_url: "http://localhost/files/x.jpg".to_string(),
            metadata: serde_json::json!({}),
            status: casefile_core::models::FileStatus::Processing,
            scan_status: casefile_core::models::ScanStatus::Clean,
            sanitize_status: casefile_core::models::SanitizeStatus::None,
            detected_threats: vec![],
            processing_error: None,
            safe_storage_key: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(file_extension(&file), "jpg");
    }
}
