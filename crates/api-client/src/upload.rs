use std::path::Path;

use bytes::Bytes;

use crate::error::{ApiError, Result};

/// Largest image the backend accepts for classification.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// An image file validated for `POST /api/chat/upload`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageUpload {
    /// Read and validate an image from disk.
    ///
    /// The content type is guessed from the extension and must be `image/*`;
    /// files over [`MAX_UPLOAD_BYTES`] are rejected without being read.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let content_type = guess_image_type(path)?;
        let meta = tokio::fs::metadata(path).await?;
        check_size(meta.len())?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self {
            file_name,
            content_type,
            bytes: Bytes::from(bytes),
        })
    }

    /// Validate an in-memory image.
    pub fn from_bytes(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<Self> {
        let content_type = content_type.into();
        if !content_type.starts_with("image/") {
            return Err(ApiError::InvalidUpload(
                "Please upload an image file".to_string(),
            ));
        }
        let bytes = bytes.into();
        check_size(bytes.len() as u64)?;
        Ok(Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        })
    }
}

fn guess_image_type(path: &Path) -> Result<String> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE {
        return Err(ApiError::InvalidUpload(
            "Please upload an image file".to_string(),
        ));
    }
    Ok(mime.essence_str().to_string())
}

fn check_size(len: u64) -> Result<()> {
    if len > MAX_UPLOAD_BYTES {
        return Err(ApiError::InvalidUpload(
            "File size must be less than 10MB".to_string(),
        ));
    }
    Ok(())
}
