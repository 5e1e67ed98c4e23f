//! Domain models

pub mod event;
pub mod failure;
pub mod file;
pub mod job;

pub use event::FileStatusEvent;
pub use failure::{
    FailureFeed, FailureKind, FailureRecord, KindCount, ReferralImportFailureKind, ScanFailureKind,
};
pub use file::{CaseFile, FileResponse, FileStatus, SanitizeStatus, ScanStatus};
pub use job::{JobStatus, ScanJob};
