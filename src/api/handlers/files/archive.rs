use crate::api::error::AppError;
use crate::services::archive::{ArchiveError, stream_archive};
use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::types::*;

/// Header listing requested names that could not be included
pub const SKIPPED_FILES_HEADER: &str = "x-skipped-files";

const SKIPPED_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

#[utoipa::path(
    post,
    path = "/batch-download",
    request_body = BatchDownloadRequest,
    responses(
        (status = 200, description = "Zip archive stream", content_type = "application/zip"),
        (status = 400, description = "Empty selection or malformed body")
    ),
    tag = "files"
)]
pub async fn batch_download(
    State(state): State<crate::AppState>,
    payload: Result<Json<BatchDownloadRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|e| {
        tracing::debug!("Rejected batch download body: {}", e);
        AppError::BadRequest(format!("Invalid request body: {}", e.body_text()))
    })?;

    if req.files.is_empty() {
        return Err(ArchiveError::EmptySelection.into());
    }

    // Pre-screen so skipped names can be reported before the body starts.
    // A file removed after this point is still skipped, only not reported.
    let mut skipped = Vec::new();
    for stored_name in &req.files {
        if !state.registry.exists(stored_name).await && !skipped.contains(stored_name) {
            skipped.push(stored_name.clone());
        }
    }

    tracing::info!(
        "📦 Batch download of {} file(s), {} skipped",
        req.files.len(),
        skipped.len()
    );

    let stream = stream_archive(state.registry.clone(), req.files, state.config.chunk_size)?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"files.zip\"",
        );

    if !skipped.is_empty() {
        let encoded = skipped
            .iter()
            .map(|name| utf8_percent_encode(name, SKIPPED_NAME_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join(",");
        if let Ok(value) = HeaderValue::from_str(&encoded) {
            builder = builder.header(SKIPPED_FILES_HEADER, value);
        }
    }

    builder
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build archive response: {}", e)))
}
