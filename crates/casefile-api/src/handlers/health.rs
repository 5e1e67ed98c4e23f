//! Health endpoint.
//!
//! Reports database reachability, queue depth, storage backend, and the
//! scanner's configured/reachable pair. A failed scanner ping is reported
//! here but never gates scan attempts; whether scanning happens is decided
//! by configuration alone.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use casefile_core::config::StorageBackendKind;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ScannerHealth {
    /// Whether a scanner endpoint is configured (the scan gate).
    pub configured: bool,
    /// Live reachability, absent when not configured. Informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<i64>,
    pub scanner: ScannerHealth,
    pub storage_backend: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .is_ok();

    let queue_depth = match state.jobs.queue_depth().await {
        Ok(depth) => Some(depth),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read queue depth");
            None
        }
    };

    // Ping uses its own short-lived socket and 5s bound; independent of
    // any in-flight scan.
    let reachable = match &state.scanner {
        Some(client) => Some(client.ping().await.is_ok()),
        None => None,
    };

    let storage_backend = match state.storage.backend_type() {
        StorageBackendKind::Local => "local",
        StorageBackendKind::S3 => "s3",
    };

    let healthy = database;
    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        database,
        queue_depth,
        scanner: ScannerHealth {
            configured: state.scanner.is_some(),
            reachable,
        },
        storage_backend: storage_backend.to_string(),
    })
}
