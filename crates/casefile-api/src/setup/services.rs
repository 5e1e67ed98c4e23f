//! Service and repository initialization.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use casefile_core::Config;
use casefile_db::{FailureRepository, FileRepository, RetryTracker, ScanJobRepository};
use casefile_notify::StatusNotifier;
use casefile_scanner::ClamdClient;
use casefile_storage::Storage;
use casefile_worker::{
    DefaultSanitizer, RescanService, RescanServiceConfig, ScanOrchestrator, ScanWorkerPool,
    ScanWorkerPoolConfig,
};
use sqlx::PgPool;

use crate::state::AppState;

/// Build repositories, the scanner client, the notifier, and spawn the
/// worker pool and rescan service.
pub async fn initialize_services(
    config: &Config,
    pool: PgPool,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let files = FileRepository::new(pool.clone());
    let jobs = ScanJobRepository::new(pool.clone());
    let failures = FailureRepository::new(pool.clone());
    let scan_failures = RetryTracker::new(failures.clone());
    let import_failures = RetryTracker::new(failures.clone());

    let notifier = StatusNotifier::new();

    // The configured flag is the scan gate; the clients themselves are
    // created once and cloned per use.
    let scanner = if config.scanner_enabled {
        tracing::info!(
            host = %config.clamd_host,
            port = config.clamd_port,
            scan_timeout_secs = config.clamd_scan_timeout_secs,
            "clamd scanner configured"
        );
        Some(ClamdClient::with_timeouts(
            config.clamd_host.clone(),
            config.clamd_port,
            Duration::from_secs(config.clamd_scan_timeout_secs),
            Duration::from_secs(config.clamd_ping_timeout_secs),
        ))
    } else {
        None
    };

    let orchestrator = Arc::new(ScanOrchestrator::new(
        files.clone(),
        jobs.clone(),
        scan_failures.clone(),
        storage.clone(),
        scanner.clone(),
        Arc::new(DefaultSanitizer),
        notifier.clone(),
    ));

    let worker_pool = ScanWorkerPool::start(
        jobs.clone(),
        orchestrator,
        ScanWorkerPoolConfig {
            max_workers: config.worker_max_jobs,
            poll_interval_ms: config.worker_poll_interval_ms,
        },
        Some(pool.clone()),
    );

    let rescan = RescanService::start(
        files.clone(),
        jobs.clone(),
        scan_failures.clone(),
        RescanServiceConfig {
            poll_interval_secs: config.rescan_interval_secs,
            batch_size: config.rescan_batch_size,
        },
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        pool,
        files,
        jobs,
        failures,
        scan_failures,
        import_failures,
        storage,
        scanner,
        notifier,
        worker_pool,
        rescan,
    }))
}
