use crate::services::archive::ArchiveError;
use crate::services::registry::RegistryError;
use crate::services::upload::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidName(_) => AppError::BadRequest("Invalid file name".to_string()),
            RegistryError::NotFound(_) => AppError::NotFound("File not found".to_string()),
            RegistryError::Unavailable(_) | RegistryError::DeleteFailed(_) | RegistryError::Io(_) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl From<ArchiveError> for AppError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::EmptySelection => AppError::BadRequest("No files selected".to_string()),
            ArchiveError::StreamFailed(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::NoFilesProvided
            | UploadError::TooManyFiles { .. }
            | UploadError::Malformed(_) => AppError::BadRequest(e.to_string()),
            UploadError::PayloadTooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            UploadError::Read(_) => AppError::BadRequest("Upload was interrupted".to_string()),
            UploadError::Write(_) => AppError::Internal(e.to_string()),
            UploadError::Registry(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: impl Into<AppError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn test_registry_error_status() {
        assert_eq!(
            status_of(RegistryError::InvalidName("../x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RegistryError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(RegistryError::Unavailable(std::io::Error::other("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(RegistryError::DeleteFailed(std::io::Error::other("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upload_error_status() {
        assert_eq!(status_of(UploadError::NoFilesProvided), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(UploadError::TooManyFiles { limit: 50 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(UploadError::PayloadTooLarge { limit: 10 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_archive_error_status() {
        assert_eq!(status_of(ArchiveError::EmptySelection), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ArchiveError::StreamFailed("sink closed".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
