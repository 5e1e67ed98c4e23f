//! OpenAPI document assembly.

use axum::Json;
use casefile_core::models::{
    FailureFeed, FailureRecord, FileResponse, FileStatus, FileStatusEvent, KindCount,
    SanitizeStatus, ScanStatus,
};
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use crate::handlers::health::{HealthResponse, ScannerHealth};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Casefile Ingestion API",
        description = "File ingestion, malware scanning, and status propagation for the case-management platform"
    ),
    paths(
        handlers::upload::upload_file,
        handlers::status::get_file,
        handlers::failures::list_failures,
        handlers::failures::count_failures,
        handlers::failures::list_failure_subjects,
        handlers::health::health,
    ),
    components(schemas(
        FileResponse,
        FileStatus,
        ScanStatus,
        SanitizeStatus,
        FileStatusEvent,
        FailureRecord,
        FailureFeed,
        KindCount,
        ErrorResponse,
        HealthResponse,
        ScannerHealth,
    )),
    tags(
        (name = "files", description = "Upload and processing status"),
        (name = "failures", description = "Failure tracker read API"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
