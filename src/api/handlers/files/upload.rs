use crate::api::error::AppError;
use crate::services::upload::UploadError;
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use super::types::*;

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data", description = "One or more files in the `files` field"),
    responses(
        (status = 200, description = "Files uploaded successfully", body = UploadResponse),
        (status = 400, description = "No files, too many files or malformed form"),
        (status = 413, description = "Upload exceeds the configured size limit")
    ),
    tag = "files"
)]
pub async fn upload_files(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut session = state.uploads.session();
    let byte_limit = state.uploads.limits().max_total_bytes.unwrap_or_default();

    // Capture errors so the session can be rolled back and the stream drained
    let result: Result<(), UploadError> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, byte_limit))?
        {
            if field.name() != Some(UPLOAD_FIELD) {
                tracing::debug!("Ignoring multipart field {:?}", field.name());
                continue;
            }

            // An empty file input still sends a part, with no filename
            let original_name = match field.file_name() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    tracing::debug!("Skipping file part without a filename");
                    continue;
                }
            };
            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(body_with_io_error);

            session.accept(&original_name, reader).await?;
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            let total_bytes = session.total_bytes();
            let files = session.finish()?;
            tracing::info!("📥 Received {} file(s), {} bytes", files.len(), total_bytes);
            Ok(Json(UploadResponse {
                success: true,
                files,
            }))
        }
        Err(e) => {
            tracing::warn!("Upload failed: {}. Rolling back and consuming remaining stream...", e);
            session.rollback().await;
            // Drain so the client sees the error instead of a connection reset
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e.into())
        }
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError, limit: u64) -> UploadError {
    let message = e.to_string();
    if message.contains("length limit exceeded") {
        UploadError::PayloadTooLarge { limit }
    } else {
        UploadError::Malformed(message)
    }
}
