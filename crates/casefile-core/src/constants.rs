//! Shared constants.

/// Default maximum upload size in bytes (50 MB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: usize = 50 * 1024 * 1024;

/// Chunk size used when streaming a payload to the scanner daemon.
pub const SCAN_CHUNK_SIZE: usize = 8192;

/// PostgreSQL NOTIFY channel fired when a scan job is enqueued.
pub const SCAN_JOB_NOTIFY_CHANNEL: &str = "casefile_new_scan_job";

/// SSE event name for status updates.
pub const STATUS_EVENT: &str = "status";

/// SSE event name for heartbeats (no payload).
pub const HEARTBEAT_EVENT: &str = "heartbeat";
