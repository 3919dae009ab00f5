use crate::api::error::AppError;
use crate::services::name_codec;
use crate::services::registry::RegistryError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;

#[utoipa::path(
    get,
    path = "/download/{stored_name}",
    params(
        ("stored_name" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "File download stream"),
        (status = 404, description = "File not found or unsafe name")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<crate::AppState>,
    Path(stored_name): Path<String>,
) -> Result<Response, AppError> {
    // Unsafe names look exactly like missing ones here
    let (file, len) = state
        .registry
        .open(&stored_name)
        .await
        .map_err(|e| match e {
            RegistryError::InvalidName(_) | RegistryError::NotFound(_) => {
                AppError::NotFound("File not found".to_string())
            }
            other => other.into(),
        })?;

    let original_name = name_codec::decode(&stored_name);
    let content_type = content_type_for(original_name);
    let content_disposition = attachment_disposition(original_name);

    tracing::info!("📎 Download {} ({} bytes)", stored_name, len);

    // Dropping the body on client abort drops the reader and its file handle
    let stream = ReaderStream::with_capacity(file, state.config.chunk_size);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}

/// Content type guessed from the original name's extension.
pub(crate) fn content_type_for(filename: &str) -> String {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" | "md" => mime::TEXT_PLAIN_UTF_8.to_string(),
        "csv" => mime::TEXT_CSV.to_string(),
        "html" | "htm" => mime::TEXT_HTML.to_string(),
        "json" => mime::APPLICATION_JSON.to_string(),
        "pdf" => mime::APPLICATION_PDF.to_string(),
        "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "gif" => mime::IMAGE_GIF.to_string(),
        "svg" => mime::IMAGE_SVG.to_string(),
        "webp" => "image/webp".to_string(),
        "mp4" => "video/mp4".to_string(),
        "webm" => "video/webm".to_string(),
        "mp3" => "audio/mpeg".to_string(),
        "wav" => "audio/wav".to_string(),
        "zip" => "application/zip".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name.
pub(crate) fn attachment_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(128)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("report.final.pdf"), "application/pdf");
        assert_eq!(content_type_for("PHOTO.JPG"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("report.final.pdf"),
            "attachment; filename=\"report.final.pdf\"; filename*=UTF-8''report%2Efinal%2Epdf"
        );
        assert!(attachment_disposition("a\"b.txt").starts_with("attachment; filename=\"ab.txt\""));
        assert!(attachment_disposition("").contains("filename=\"file\""));
    }
}
