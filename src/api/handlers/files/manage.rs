use crate::api::error::AppError;
use axum::{
    Json,
    extract::{Path, State},
};

use super::types::*;

#[utoipa::path(
    delete,
    path = "/delete/{stored_name}",
    params(
        ("stored_name" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 400, description = "Unsafe file name"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<crate::AppState>,
    Path(stored_name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.registry.remove(&stored_name).await?;

    tracing::info!("🗑️  Deleted {}", stored_name);

    Ok(Json(DeleteResponse {
        success: true,
        stored_name,
    }))
}
