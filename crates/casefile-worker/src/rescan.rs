//! Scheduled re-scan of files whose processing failed.
//!
//! Drains the scan-pipeline failure feed in tracker order (fewest retries
//! first, oldest first among ties) and re-enqueues a scan job for each
//! subject. The orchestrator re-records a failure on every unsuccessful
//! attempt and resolves the record once the file reaches a terminal state.

use std::str::FromStr;
use std::time::Duration;

use casefile_core::models::ScanFailureKind;
use casefile_db::{FileRepository, RetryTracker, ScanJobRepository};
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;

#[derive(Clone)]
pub struct RescanServiceConfig {
    pub poll_interval_secs: u64,
    pub batch_size: i64,
}

impl Default for RescanServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            batch_size: casefile_db::DEFAULT_FAILURE_BATCH_SIZE,
        }
    }
}

/// How long a job may sit in `running` before its worker is presumed dead
/// and the job is returned to the queue. Comfortably above the scan
/// timeout so a slow-but-alive scan is never double-claimed.
const STALE_JOB_GRACE_SECS: i32 = 600;

/// Background service that re-enqueues failed scans.
pub struct RescanService {
    shutdown_tx: mpsc::Sender<()>,
}

impl RescanService {
    pub fn start(
        files: FileRepository,
        jobs: ScanJobRepository,
        tracker: RetryTracker<ScanFailureKind>,
        config: RescanServiceConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::worker_loop(files, jobs, tracker, config, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    async fn worker_loop(
        files: FileRepository,
        jobs: ScanJobRepository,
        tracker: RetryTracker<ScanFailureKind>,
        config: RescanServiceConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut poll_interval = interval(Duration::from_secs(config.poll_interval_secs));

        tracing::info!(
            poll_interval_secs = config.poll_interval_secs,
            batch_size = config.batch_size,
            "Rescan service started"
        );

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if let Err(e) = jobs.requeue_stale_jobs(STALE_JOB_GRACE_SECS).await {
                        tracing::error!(error = %e, "Error requeueing stale jobs");
                    }
                    if let Err(e) = Self::process_batch(&files, &jobs, &tracker, config.batch_size).await {
                        tracing::error!(error = %e, "Error processing rescan batch");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Rescan service shutting down");
                    break;
                }
            }
        }
    }

    async fn process_batch(
        files: &FileRepository,
        jobs: &ScanJobRepository,
        tracker: &RetryTracker<ScanFailureKind>,
        batch_size: i64,
    ) -> anyhow::Result<()> {
        let batch = tracker.list_unresolved(batch_size).await?;
        if batch.is_empty() {
            return Ok(());
        }

        tracing::info!(count = batch.len(), "Re-enqueueing failed scans");

        for record in batch {
            let file_id = match Uuid::from_str(&record.subject_id) {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!(
                        subject_id = %record.subject_id,
                        "Failure record subject is not a file id; skipping"
                    );
                    continue;
                }
            };

            let Some(file) = files.get_by_id(file_id).await? else {
                // The owning business layer deleted the file; there is
                // nothing left to retry. The record stays on the books.
                tracing::warn!(file_id = %file_id, "File gone, skipping rescan");
                continue;
            };

            if file.scan_status.is_verdict() && file.processing_error.is_none() {
                tracing::debug!(file_id = %file_id, "File already settled, skipping rescan");
                continue;
            }

            jobs.enqueue(&file).await?;
            tracing::info!(
                file_id = %file_id,
                retry_count = record.retry_count,
                kind = %record.kind,
                "Scan re-enqueued"
            );
        }

        Ok(())
    }

    /// Signal the service to stop after the current batch.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
