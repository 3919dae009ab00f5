//! Directory-backed file registry.
//!
//! There is no index: every call reads the storage directory, so the
//! directory contents are the only source of truth and a name returned by
//! [`FileRegistry::list`] may already be gone when it is next used.

use crate::models::StoredFile;
use crate::services::name_codec;
use crate::utils::validation::is_safe_stored_name;
use std::cmp::Ordering;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};

/// Attempts at finding a free stored name before giving up
const MAX_CREATE_ATTEMPTS: usize = 16;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Storage directory unavailable: {0}")]
    Unavailable(#[source] std::io::Error),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to delete file: {0}")]
    DeleteFailed(#[source] std::io::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FileRegistry {
    root: Arc<PathBuf>,
}

impl FileRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    /// Create the storage directory if needed and return a registry over it.
    pub async fn open_or_create(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let registry = Self::new(root);
        fs::create_dir_all(registry.root())
            .await
            .map_err(RegistryError::Unavailable)?;
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Path of a stored name, rejecting anything that could leave the root.
    pub fn resolve(&self, stored_name: &str) -> Result<PathBuf, RegistryError> {
        if !is_safe_stored_name(stored_name) {
            return Err(RegistryError::InvalidName(stored_name.to_string()));
        }
        Ok(self.root.join(stored_name))
    }

    /// Unsafe names are reported as missing.
    pub async fn exists(&self, stored_name: &str) -> bool {
        match self.resolve(stored_name) {
            Ok(path) => fs::metadata(path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Snapshot of the directory, newest upload first.
    pub async fn list(&self) -> Result<Vec<StoredFile>, RegistryError> {
        let mut dir = fs::read_dir(self.root())
            .await
            .map_err(RegistryError::Unavailable)?;

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(RegistryError::Unavailable)? {
            // Entry may vanish between readdir and stat
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    tracing::debug!("Skipping entry {:?}: {}", entry.file_name(), e);
                    continue;
                }
            };
            if !file_type.is_file() {
                continue;
            }

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!("Skipping non UTF-8 entry {:?}", raw);
                    continue;
                }
            };
            if !is_safe_stored_name(&name) {
                continue;
            }

            files.push(StoredFile::from_stored_name(name));
        }

        files.sort_by(newest_first);
        Ok(files)
    }

    /// Open a stored file for reading, with its length.
    pub async fn open(&self, stored_name: &str) -> Result<(File, u64), RegistryError> {
        let path = self.resolve(stored_name)?;

        let file = File::open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => RegistryError::NotFound(stored_name.to_string()),
            _ => RegistryError::Io(e),
        })?;

        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(RegistryError::NotFound(stored_name.to_string()));
        }

        Ok((file, meta.len()))
    }

    pub async fn remove(&self, stored_name: &str) -> Result<(), RegistryError> {
        let path = self.resolve(stored_name)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(RegistryError::NotFound(stored_name.to_string()))
            }
            Err(e) => Err(RegistryError::DeleteFailed(e)),
        }
    }

    /// Allocate a fresh stored name for `original_name` and create it.
    ///
    /// Creation is exclusive, so a name taken by a concurrent upload (or by
    /// another process sharing the directory) is never overwritten; the next
    /// millisecond is tried instead.
    pub async fn create_unique(&self, original_name: &str) -> Result<(String, File), RegistryError> {
        let mut last_error = None;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let stored_name = name_codec::encode(original_name);
            let path = self.resolve(&stored_name)?;

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((stored_name, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("Stored name {} taken, retrying", stored_name);
                    last_error = Some(e);
                }
                Err(e) => return Err(RegistryError::Io(e)),
            }
        }

        Err(RegistryError::Io(last_error.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::AlreadyExists, "no free stored name")
        })))
    }

    /// Whether the storage directory can currently be read.
    pub async fn probe(&self) -> bool {
        fs::read_dir(self.root()).await.is_ok()
    }
}

/// Timestamp prefix descending, then name descending; unprefixed names last.
fn newest_first(a: &StoredFile, b: &StoredFile) -> Ordering {
    b.uploaded_at_millis()
        .cmp(&a.uploaded_at_millis())
        .then_with(|| b.stored_name.cmp(&a.stored_name))
}
