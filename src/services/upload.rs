use crate::services::registry::{FileRegistry, RegistryError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No files uploaded")]
    NoFilesProvided,

    #[error("Too many files: at most {limit} per upload")]
    TooManyFiles { limit: usize },

    #[error("Upload exceeds the maximum of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("Failed to read upload body: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write upload: {0}")]
    Write(#[source] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Per-request limits
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_files: usize,
    /// `None` leaves the request size unbounded
    pub max_total_bytes: Option<u64>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 50,
            max_total_bytes: None,
        }
    }
}

/// Persists uploaded parts into the registry.
pub struct UploadReceiver {
    registry: FileRegistry,
    limits: UploadLimits,
    chunk_size: usize,
}

impl UploadReceiver {
    pub fn new(registry: FileRegistry, limits: UploadLimits, chunk_size: usize) -> Self {
        Self {
            registry,
            limits,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Start a request-scoped session.
    pub fn session(&self) -> UploadSession {
        UploadSession {
            registry: self.registry.clone(),
            limits: self.limits,
            chunk_size: self.chunk_size,
            created: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Store every part, or none of them.
    pub async fn receive<R>(&self, parts: Vec<(String, R)>) -> Result<Vec<String>, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let mut session = self.session();
        for (original_name, reader) in parts {
            if let Err(e) = session.accept(&original_name, reader).await {
                session.rollback().await;
                return Err(e);
            }
        }
        session.finish()
    }
}

/// Files written so far by one upload request.
///
/// A failed request must call [`UploadSession::rollback`] so that no partial
/// set of files survives it.
pub struct UploadSession {
    registry: FileRegistry,
    limits: UploadLimits,
    chunk_size: usize,
    created: Vec<String>,
    total_bytes: u64,
}

impl UploadSession {
    /// Stream one part into a freshly allocated stored name.
    pub async fn accept<R>(&mut self, original_name: &str, mut reader: R) -> Result<String, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        if self.created.len() >= self.limits.max_files {
            return Err(UploadError::TooManyFiles {
                limit: self.limits.max_files,
            });
        }

        let (stored_name, mut file) = self.registry.create_unique(original_name).await?;
        // Tracked before any byte lands so a failure below is rolled back too
        self.created.push(stored_name.clone());

        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| self.read_error(e))?;
            if n == 0 {
                break;
            }

            self.total_bytes += n as u64;
            if let Some(limit) = self.limits.max_total_bytes {
                if self.total_bytes > limit {
                    return Err(UploadError::PayloadTooLarge { limit });
                }
            }

            file.write_all(&buffer[..n])
                .await
                .map_err(UploadError::Write)?;
        }
        file.flush().await.map_err(UploadError::Write)?;

        tracing::debug!("Stored {} as {}", original_name, stored_name);
        Ok(stored_name)
    }

    /// Body-limit violations from the HTTP layer arrive as read errors.
    fn read_error(&self, e: std::io::Error) -> UploadError {
        if e.to_string().contains("length limit exceeded") {
            UploadError::PayloadTooLarge {
                limit: self.limits.max_total_bytes.unwrap_or(self.total_bytes),
            }
        } else {
            UploadError::Read(e)
        }
    }

    pub fn file_count(&self) -> usize {
        self.created.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Stored names created by this request.
    pub fn finish(self) -> Result<Vec<String>, UploadError> {
        if self.created.is_empty() {
            return Err(UploadError::NoFilesProvided);
        }
        Ok(self.created)
    }

    /// Remove every file this request created.
    pub async fn rollback(self) {
        for stored_name in &self.created {
            match self.registry.remove(stored_name).await {
                Ok(()) | Err(RegistryError::NotFound(_)) => {}
                Err(e) => tracing::error!("Failed to roll back {}: {}", stored_name, e),
            }
        }
        if !self.created.is_empty() {
            tracing::warn!("Rolled back {} uploaded file(s)", self.created.len());
        }
    }
}
