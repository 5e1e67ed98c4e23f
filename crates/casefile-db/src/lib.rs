//! Database repositories for the ingestion pipeline.
//!
//! Repositories are thin sqlx wrappers over the three pipeline tables:
//! `case_files` (file records and their status fields), `scan_jobs` (the
//! job queue), and `failure_records` (the generic retry tracker shared by
//! the scan pipeline and the referral-import feed).

pub mod db;

pub use db::failures::{FailureRepository, RetryTracker, DEFAULT_FAILURE_BATCH_SIZE};
pub use db::files::{CreateFileParams, FileRepository};
pub use db::jobs::ScanJobRepository;
