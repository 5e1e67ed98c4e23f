//! Casefile ingestion API
//!
//! Axum application exposing the upload, status, event-stream, health, and
//! failure-tracking endpoints, with the scan worker pool and rescan service
//! running in-process.

pub mod api_doc;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;
