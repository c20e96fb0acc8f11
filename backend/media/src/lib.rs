//! `voicenotes-media` — local disk persistence for uploaded audio files.
//!
//! Uploads are written under a configured directory with a generated
//! `uuid.ext` name so concurrent uploads of the same filename never collide.
//! The original filename is preserved in the returned [`SavedFile`] and stored
//! on the record, never used on disk.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Rejected or failed upload writes.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("unsupported audio format: {0}")]
    UnsupportedExtension(String),

    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("failed to write upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of persisting one upload.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub path: String,
    pub original_name: String,
    pub size: u64,
}

/// Writes uploads to and deletes files from the local upload directory.
pub struct MediaStore {
    upload_dir: PathBuf,
    max_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl MediaStore {
    pub fn new(upload_dir: PathBuf, max_bytes: u64, allowed_extensions: Vec<String>) -> Self {
        Self {
            upload_dir,
            max_bytes,
            allowed_extensions,
        }
    }

    /// Persist an upload's bytes under a fresh `uuid.ext` name.
    ///
    /// Creates the upload directory on first use. The extension is taken from
    /// the client-supplied filename and checked against the allow-list.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<SavedFile, MediaError> {
        let ext = extension_of(original_name);
        if !self.allowed_extensions.iter().any(|a| a == &ext) {
            return Err(MediaError::UnsupportedExtension(ext));
        }
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(MediaError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(format!("{}{ext}", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size, "Upload written");

        Ok(SavedFile {
            path: path.to_string_lossy().into_owned(),
            original_name: original_name.to_string(),
            size,
        })
    }

    /// Best-effort file removal. Returns whether a file was deleted.
    pub async fn delete(&self, path: &str) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path, error = %e, "Failed to delete upload");
                false
            }
        }
    }
}

/// Lowercased extension including the leading dot, empty when absent.
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
