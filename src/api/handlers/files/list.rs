use crate::api::error::AppError;
use crate::models::StoredFile;
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/files",
    responses(
        (status = 200, description = "Stored files, newest first", body = Vec<StoredFile>),
        (status = 500, description = "Storage directory unreadable")
    ),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<crate::AppState>,
) -> Result<Json<Vec<StoredFile>>, AppError> {
    let files = state.registry.list().await?;
    Ok(Json(files))
}
