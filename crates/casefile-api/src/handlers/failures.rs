//! Read-only views over the failure tracker, per feed.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use casefile_core::models::{FailureFeed, FailureRecord, KindCount};
use casefile_core::AppError;
use casefile_db::DEFAULT_FAILURE_BATCH_SIZE;
use serde::Deserialize;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_FAILURE_BATCH_SIZE
}

fn parse_feed(feed: &str) -> Result<FailureFeed, HttpAppError> {
    FailureFeed::parse(feed).ok_or_else(|| {
        HttpAppError(AppError::InvalidInput(format!(
            "Unknown failure feed '{}'; expected 'scan_pipeline' or 'referral_import'",
            feed
        )))
    })
}

#[utoipa::path(
    get,
    path = "/api/v0/failures/{feed}",
    tag = "failures",
    params(
        ("feed" = String, Path, description = "Failure feed: scan_pipeline or referral_import"),
        ("limit" = Option<i64>, Query, description = "Batch size (default 10)")
    ),
    responses(
        (status = 200, description = "Unresolved failures in retry order", body = Vec<FailureRecord>),
        (status = 400, description = "Unknown feed", body = ErrorResponse)
    )
)]
pub async fn list_failures(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FailureRecord>>, HttpAppError> {
    let feed = parse_feed(&feed)?;
    let records = state
        .failures
        .list_unresolved(feed, query.limit)
        .await
        .map_err(HttpAppError::from)?;

    Ok(Json(records))
}

#[utoipa::path(
    get,
    path = "/api/v0/failures/{feed}/counts",
    tag = "failures",
    params(("feed" = String, Path, description = "Failure feed")),
    responses(
        (status = 200, description = "Unresolved failure counts by error kind", body = Vec<KindCount>),
        (status = 400, description = "Unknown feed", body = ErrorResponse)
    )
)]
pub async fn count_failures(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
) -> Result<Json<Vec<KindCount>>, HttpAppError> {
    let feed = parse_feed(&feed)?;
    let counts = state
        .failures
        .count_by_kind(feed)
        .await
        .map_err(HttpAppError::from)?;

    Ok(Json(counts))
}

#[utoipa::path(
    get,
    path = "/api/v0/failures/{feed}/subjects",
    tag = "failures",
    params(("feed" = String, Path, description = "Failure feed")),
    responses(
        (status = 200, description = "Subject ids with unresolved failures", body = Vec<String>),
        (status = 400, description = "Unknown feed", body = ErrorResponse)
    )
)]
pub async fn list_failure_subjects(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
) -> Result<Json<Vec<String>>, HttpAppError> {
    let feed = parse_feed(&feed)?;
    let subjects = state
        .failures
        .list_unresolved_subject_ids(feed)
        .await
        .map_err(HttpAppError::from)?;

    Ok(Json(subjects))
}
