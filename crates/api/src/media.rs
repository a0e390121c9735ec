//! Media storage for chat image uploads
//!
//! Objects are written under the configured media directory with random
//! names and served back from `/media/*`.

use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ApiError;

/// Local-disk blob store
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl MediaStore {
    pub fn new(dir: PathBuf, max_bytes: usize) -> Self {
        Self { dir, max_bytes }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Create the media directory if missing
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Store an image and return its object name
    pub async fn store_image(&self, content_type: &str, bytes: &[u8]) -> Result<String, ApiError> {
        let extension = image_extension(content_type).ok_or(ApiError::UnsupportedMediaType)?;

        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ApiError::PayloadTooLarge);
        }

        let object_name = format!("{}.{}", Uuid::new_v4().simple(), extension);
        let path = self.dir.join(&object_name);

        tokio::fs::write(&path, bytes).await.map_err(|e| {
            tracing::error!(error = %e, path = %path.display(), "Failed to write media object");
            ApiError::Internal
        })?;

        tracing::info!(object = %object_name, size = bytes.len(), "Stored media object");

        Ok(object_name)
    }
}

/// File extension for accepted image content types
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}
