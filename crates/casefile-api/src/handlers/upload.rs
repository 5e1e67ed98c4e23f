use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use casefile_core::models::FileResponse;

use crate::error::{ErrorResponse, HttpAppError};
use crate::services::FileUploadService;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/v0/files",
    tag = "files",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File accepted and queued for scanning", body = FileResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 415, description = "Unsupported file type", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<FileResponse>, HttpAppError> {
    let service = FileUploadService::new(&state);
    let file = service.upload(multipart).await?;

    Ok(Json(FileResponse::from(file)))
}
