//! Worker pool: claims scan jobs and dispatches them to the orchestrator.
//!
//! Wakes on PostgreSQL LISTEN/NOTIFY when a job is enqueued, and polls at
//! a fixed interval as a fallback. A semaphore caps concurrent jobs; one
//! claimed job occupies its worker until the file reaches a terminal
//! state, which is the pipeline's backpressure: a stalled scanner degrades
//! throughput instead of corrupting state.

use std::sync::Arc;
use std::time::Duration;

use casefile_core::constants::SCAN_JOB_NOTIFY_CHANNEL;
use casefile_db::ScanJobRepository;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use crate::orchestrator::ScanOrchestrator;

#[derive(Clone)]
pub struct ScanWorkerPoolConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
}

impl Default for ScanWorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
        }
    }
}

pub struct ScanWorkerPool {
    shutdown_tx: mpsc::Sender<()>,
}

impl ScanWorkerPool {
    /// Start the pool. If `pg_pool` is `Some`, a LISTEN task wakes the
    /// claim loop as soon as a job is enqueued; polling continues either
    /// way so missed notifications only add latency, never lose jobs.
    pub fn start(
        jobs: ScanJobRepository,
        orchestrator: Arc<ScanOrchestrator>,
        config: ScanWorkerPoolConfig,
        pg_pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::worker_pool(jobs, orchestrator, config, shutdown_rx, pg_pool).await;
        });

        Self { shutdown_tx }
    }

    async fn worker_pool(
        jobs: ScanJobRepository,
        orchestrator: Arc<ScanOrchestrator>,
        config: ScanWorkerPoolConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
        pg_pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pg_pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Scan worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pg_pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(SCAN_JOB_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Scan worker pool shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&jobs, &orchestrator, &semaphore).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&jobs, &orchestrator, &semaphore).await;
                }
            }
        }

        tracing::info!("Scan worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        jobs: &ScanJobRepository,
        orchestrator: &Arc<ScanOrchestrator>,
        semaphore: &Arc<Semaphore>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match jobs.claim_next_job().await {
            Ok(Some(job)) => {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = orchestrator.process_job(&job).await {
                        tracing::error!(
                            error = %e,
                            job_id = %job.id,
                            file_id = %job.file_id,
                            "Job processing failed"
                        );
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No scan jobs available");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim scan job");
            }
        }
    }

    /// Signal the pool to stop claiming new jobs. In-flight jobs run to
    /// completion; this does not wait for them.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating scan worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}
