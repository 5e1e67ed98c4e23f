use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use casefile_core::models::FileResponse;
use casefile_core::AppError;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/v0/files/{id}",
    tag = "files",
    params(("id" = Uuid, Path, description = "File id")),
    responses(
        (status = 200, description = "Current processing status", body = FileResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileResponse>, HttpAppError> {
    let file = state
        .files
        .get_by_id(id)
        .await
        .map_err(HttpAppError::from)?
        .ok_or_else(|| HttpAppError(AppError::NotFound(format!("File {} not found", id))))?;

    Ok(Json(FileResponse::from(file)))
}
