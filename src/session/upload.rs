use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::gateway::ImagePayload;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Unsupported file type '{0}'. Upload a JPEG or PNG image.")]
    UnsupportedType(String),

    #[error("Image too large ({size} bytes > {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded image held in a temporary file until it is analyzed.
///
/// Dropping the handle deletes the file.
#[derive(Debug)]
pub struct StagedImage {
    name: String,
    media_type: String,
    size: u64,
    file: NamedTempFile,
}

impl StagedImage {
    /// Validate and write `bytes` to a temporary file under `dir`.
    pub fn stage(name: &str, bytes: &[u8], max_size: u64, dir: &Path) -> Result<Self, UploadError> {
        let media_type = image_media_type(name)?;

        let size = bytes.len() as u64;
        if size == 0 {
            return Err(UploadError::Empty);
        }
        if size > max_size {
            return Err(UploadError::TooLarge {
                size,
                max: max_size,
            });
        }

        let suffix = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("medassist-")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        debug!("Staged upload {} ({} bytes) at {}", name, size, file.path().display());

        Ok(Self {
            name: name.to_string(),
            media_type: media_type.to_string(),
            size,
            file,
        })
    }

    /// Stage a file from disk (CLI path).
    pub fn from_path(path: &Path, max_size: u64, dir: &Path) -> Result<Self, UploadError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        // Check type and size before reading the whole file
        image_media_type(&name)?;
        let size = std::fs::metadata(path)?.len();
        if size > max_size {
            return Err(UploadError::TooLarge {
                size,
                max: max_size,
            });
        }
        let bytes = std::fs::read(path)?;
        Self::stage(&name, &bytes, max_size, dir)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    /// Read the staged bytes back for dispatch.
    pub fn payload(&self) -> Result<ImagePayload, UploadError> {
        let bytes = std::fs::read(self.file.path())?;
        Ok(ImagePayload::new(bytes, self.media_type.clone()))
    }

    /// Delete the backing file now, reporting failures.
    pub fn release(self) -> Result<(), UploadError> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        debug!("Released staged upload {}", path.display());
        Ok(())
    }
}

/// Accepted media type for an upload name (JPEG/PNG only).
pub fn image_media_type(name: &str) -> Result<&'static str, UploadError> {
    let mime = mime_guess::from_path(name).first_raw();
    match mime {
        Some(m @ ("image/jpeg" | "image/png")) => Ok(m),
        Some(other) => Err(UploadError::UnsupportedType(other.to_string())),
        None => Err(UploadError::UnsupportedType(name.to_string())),
    }
}
