use std::env;
use std::path::PathBuf;

/// Runtime configuration for the share service
#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// Directory holding every stored file (default: "uploads")
    pub storage_dir: PathBuf,

    /// Directory with the browser UI assets (default: "html")
    pub static_dir: PathBuf,

    /// Port for the HTTP server (default: 3000)
    pub port: u16,

    /// Maximum number of files accepted in one upload request (default: 50)
    pub max_files_per_upload: usize,

    /// Maximum total bytes accepted in one upload request (default: unbounded)
    pub max_upload_bytes: Option<u64>,

    /// Buffer size for upload copies and archive chunks in bytes (default: 64 KB)
    pub chunk_size: usize,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("html"),
            port: 3000,
            max_files_per_upload: 50,
            max_upload_bytes: None,
            chunk_size: 64 * 1024, // 64 KB
        }
    }
}

impl ShareConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            storage_dir: env::var("STORAGE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.storage_dir),

            static_dir: env::var("STATIC_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.static_dir),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            max_files_per_upload: env::var("MAX_FILES_PER_UPLOAD")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.max_files_per_upload),

            // "0" or an unparsable value keeps uploads unbounded
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .or(default.max_upload_bytes),

            chunk_size: env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.chunk_size),
        }
    }

    /// Create config for development (local directories, small chunks)
    pub fn development() -> Self {
        Self {
            storage_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("html"),
            port: 3000,
            max_files_per_upload: 50,
            max_upload_bytes: Some(1024 * 1024 * 1024),
            chunk_size: 16 * 1024,
        }
    }

    /// Same config rooted at a different storage directory
    pub fn with_storage_dir(mut self, storage_dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = storage_dir.into();
        self
    }
}
