//! Application state shared across handlers and background services.

use std::sync::Arc;

use casefile_core::models::{ReferralImportFailureKind, ScanFailureKind};
use casefile_core::Config;
use casefile_db::{FailureRepository, FileRepository, RetryTracker, ScanJobRepository};
use casefile_notify::StatusNotifier;
use casefile_scanner::ClamdClient;
use casefile_storage::Storage;
use casefile_worker::{RescanService, ScanWorkerPool};
use sqlx::PgPool;

pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub files: FileRepository,
    pub jobs: ScanJobRepository,
    pub failures: FailureRepository,
    pub scan_failures: RetryTracker<ScanFailureKind>,
    pub import_failures: RetryTracker<ReferralImportFailureKind>,
    pub storage: Arc<dyn Storage>,
    /// `None` when no scanner endpoint is configured; the health endpoint
    /// reports this separately from live reachability.
    pub scanner: Option<ClamdClient>,
    pub notifier: StatusNotifier,
    /// Background services; held so they live as long as the app.
    pub worker_pool: ScanWorkerPool,
    pub rescan: RescanService,
}
