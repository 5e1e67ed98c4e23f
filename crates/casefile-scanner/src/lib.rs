//! clamd wire-protocol client.
//!
//! Speaks the scanning daemon's socket protocol directly: `PING`/`PONG`
//! health checks and `zINSTREAM` streaming scans with length-prefixed
//! chunks. One fresh TCP connection per call, hard per-call timeouts, and
//! verdict parsing that never converts "no answer" into "clean".

mod clamd;

pub use clamd::{ClamdClient, ClamdError, ScanVerdict};
