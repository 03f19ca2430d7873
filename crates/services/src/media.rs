use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use vuko_config::MediaSettings;

const MAX_NAME_LEN: usize = 100;
const FALLBACK_NAME: &str = "answer";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media payload is empty")]
    Empty,
    #[error("Media payload is {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },
    #[error("Media file not found: {0}")]
    Missing(String),
    #[error("Media I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Whether the file itself is unusable, as opposed to a storage fault
    /// worth retrying.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, MediaError::Io(_))
    }
}

/// Stores uploaded answer media on local disk.
pub struct MediaStorage {
    root: PathBuf,
    max_bytes: u64,
}

impl MediaStorage {
    pub fn new(settings: &MediaSettings) -> Self {
        Self::with_root(&settings.upload_dir, settings.max_bytes)
    }

    pub fn with_root(root: impl AsRef<Path>, max_bytes: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_bytes,
        }
    }

    fn check_size(&self, size: u64) -> Result<(), MediaError> {
        if size == 0 {
            return Err(MediaError::Empty);
        }
        if size > self.max_bytes {
            return Err(MediaError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Writes `bytes` as `{uuid}_{sanitized name}` and returns the stored path.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, MediaError> {
        self.check_size(bytes.len() as u64)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let file_name = format!("{}_{}", uuid::Uuid::new_v4(), sanitize_file_name(original_name));
        let path = self.root.join(file_name);
        tokio::fs::write(&path, bytes).await?;

        let stored = path.to_string_lossy().into_owned();
        debug!(path = %stored, bytes = bytes.len(), "Media stored");
        Ok(stored)
    }

    /// Checks that a stored file exists and is non-empty. Returns its size.
    pub async fn validate(&self, path: &str) -> Result<u64, MediaError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MediaError::Missing(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(MediaError::Missing(path.to_string()));
        }
        if meta.len() == 0 {
            return Err(MediaError::Empty);
        }
        Ok(meta.len())
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>, MediaError> {
        self.validate(path).await?;
        Ok(tokio::fs::read(path).await?)
    }

    /// Deletes a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, path: &str) -> Result<bool, MediaError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduces an uploaded file name to a safe, flat name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches(['.', '_']);
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}
