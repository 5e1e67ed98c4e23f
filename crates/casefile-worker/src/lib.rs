//! Scan worker: orchestrator, worker pool, sanitizer, and rescan service.
//!
//! The pool claims jobs from the queue (LISTEN/NOTIFY wake plus polling)
//! and hands each to the orchestrator, which drives the per-file state
//! machine to a terminal state, persisting and publishing every
//! transition. The rescan service drains unresolved scan failures and
//! feeds them back into the queue.

pub mod orchestrator;
pub mod pool;
pub mod rescan;
pub mod sanitize;

pub use orchestrator::ScanOrchestrator;
pub use pool::{ScanWorkerPool, ScanWorkerPoolConfig};
pub use rescan::{RescanService, RescanServiceConfig};
pub use sanitize::{DefaultSanitizer, SanitizeError, Sanitizer};
