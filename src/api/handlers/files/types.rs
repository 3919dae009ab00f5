use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart field carrying the uploaded files
pub const UPLOAD_FIELD: &str = "files";

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    /// Stored names created by the upload, in request order
    pub files: Vec<String>,
}

/// Documentation-only shape of the upload form
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub stored_name: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BatchDownloadRequest {
    /// Stored names to bundle
    #[serde(default)]
    pub files: Vec<String>,
}
