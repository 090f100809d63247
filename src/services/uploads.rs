//! Image upload validation and storage

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{
    config::UploadConfig,
    error::{AppError, AppResult},
};

/// Folder for member profile pictures
pub const PROFILE_PICTURES: &str = "profile_pics";
/// Folder for book cover images
pub const BOOK_COVERS: &str = "book_covers";

/// An image accepted by [`UploadService::validate_image`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    pub extension: String,
    pub mime_type: String,
}

#[derive(Clone)]
pub struct UploadService {
    config: UploadConfig,
}

impl UploadService {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Check extension, size and sniffed content of an uploaded image
    pub fn validate_image(&self, file_name: &str, data: &[u8]) -> AppResult<ValidatedImage> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !self.config.allowed_extensions.iter().any(|e| *e == extension) {
            return Err(AppError::Validation(format!(
                "Invalid file type. Allowed types: {}",
                self.config.allowed_extensions.join(", ")
            )));
        }

        if data.len() > self.config.max_image_size {
            return Err(AppError::Validation(format!(
                "File too large. Maximum size is {}.",
                human_size(self.config.max_image_size)
            )));
        }

        let mime_type = sniff_mime(data);
        if !self.config.allowed_mime_types.iter().any(|m| *m == mime_type) {
            return Err(AppError::Validation(format!(
                "Invalid file content. File appears to be {}, not an image.",
                mime_type
            )));
        }

        Ok(ValidatedImage { extension, mime_type })
    }

    /// Validate and write an image under `<media_root>/<folder>/` with a random name.
    /// Returns the path relative to the media root.
    pub async fn store_image(&self, folder: &str, file_name: &str, data: &[u8]) -> AppResult<String> {
        let image = self.validate_image(file_name, data)?;

        let dir = self.config.media_root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {}", e)))?;

        let stored_name = secure_file_name(&image.extension);
        let target = dir.join(&stored_name);
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

        let path = format!("{}/{}", folder, stored_name);
        tracing::info!("Stored upload {} ({}, {} bytes)", path, image.mime_type, data.len());

        Ok(path)
    }

    /// Delete a previously stored file; missing files are ignored
    pub async fn remove(&self, relative_path: &str) {
        let Some(path) = self.resolve(relative_path) else {
            tracing::warn!("Refusing to remove upload outside media root: {}", relative_path);
            return;
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove old upload {}: {}", relative_path, e);
            }
        }
    }

    fn resolve(&self, relative_path: &str) -> Option<PathBuf> {
        let relative = Path::new(relative_path);
        let safe = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        safe.then(|| self.config.media_root.join(relative))
    }
}

/// Random on-disk name; the client's file name is never reused
pub fn secure_file_name(extension: &str) -> String {
    format!("{}.{}", Uuid::new_v4().simple(), extension)
}

/// Byte count in whole MB when it divides evenly, else in KB
fn human_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// MIME type of the content, from its leading bytes
pub fn sniff_mime(data: &[u8]) -> String {
    if let Ok(format) = image::guess_format(data) {
        return format.to_mime_type().to_string();
    }
    if data.starts_with(b"%PDF") {
        return "application/pdf".to_string();
    }
    if data.is_empty() {
        return "application/x-empty".to_string();
    }
    if std::str::from_utf8(data).is_ok() {
        return "text/plain".to_string();
    }
    "application/octet-stream".to_string()
}
