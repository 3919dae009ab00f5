pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::ShareConfig;
use crate::services::registry::FileRegistry;
use crate::services::upload::{UploadLimits, UploadReceiver};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and part headers on top of the file bytes
const MULTIPART_OVERHEAD: u64 = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::list::list_files,
        api::handlers::files::download::download_file,
        api::handlers::files::manage::delete_file,
        api::handlers::files::upload::upload_files,
        api::handlers::files::archive::batch_download,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::StoredFile,
            api::handlers::files::UploadResponse,
            api::handlers::files::UploadForm,
            api::handlers::files::DeleteResponse,
            api::handlers::files::BatchDownloadRequest,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "files", description = "File sharing endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub registry: FileRegistry,
    pub uploads: Arc<UploadReceiver>,
    pub config: ShareConfig,
}

impl AppState {
    pub fn new(registry: FileRegistry, config: ShareConfig) -> Self {
        let limits = UploadLimits {
            max_files: config.max_files_per_upload,
            max_total_bytes: config.max_upload_bytes,
        };
        let uploads = Arc::new(UploadReceiver::new(
            registry.clone(),
            limits,
            config.chunk_size,
        ));

        Self {
            registry,
            uploads,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let upload_body_limit = match state.config.max_upload_bytes {
        Some(max) => DefaultBodyLimit::max(
            usize::try_from(max.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX),
        ),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/files", get(api::handlers::files::list_files))
        .route(
            "/download/:stored_name",
            get(api::handlers::files::download_file),
        )
        .route(
            "/delete/:stored_name",
            delete(api::handlers::files::delete_file),
        )
        .route(
            "/upload",
            post(api::handlers::files::upload_files).layer(upload_body_limit),
        )
        .route(
            "/batch-download",
            post(api::handlers::files::batch_download),
        )
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
