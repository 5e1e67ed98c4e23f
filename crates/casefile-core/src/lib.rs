//! Core domain types for the Casefile ingestion pipeline.
//!
//! This crate holds the pieces every other Casefile crate depends on: the
//! unified `AppError` type, environment-driven configuration, the file /
//! job / failure-record models with their status enums, and the upload
//! validator (content-type sniffing and filename sanitization).

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod validation;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
