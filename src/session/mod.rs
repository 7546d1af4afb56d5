//! Per-client state for one interactive session. Nothing is persisted.

mod upload;

pub use upload::{image_media_type, StagedImage, UploadError};

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Session {
    pub uploaded_image: Option<StagedImage>,
    /// Most recent analysis text from the model
    pub last_result: Option<String>,
}

/// Cloneable view of a session without the image handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub has_image: bool,
    pub image_name: Option<String>,
    pub last_result: Option<String>,
}

/// Holds the session for a single client. An uninitialized store is an empty session.
#[derive(Debug, Default)]
pub struct SessionStore {
    session: Session,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> &Session {
        &self.session
    }

    /// Replace the whole session. A previously staged image is released.
    pub fn set(&mut self, session: Session) {
        self.session = session;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            has_image: self.session.uploaded_image.is_some(),
            image_name: self
                .session
                .uploaded_image
                .as_ref()
                .map(|i| i.name().to_string()),
            last_result: self.session.last_result.clone(),
        }
    }

    pub fn last_result(&self) -> Option<&str> {
        self.session.last_result.as_deref()
    }

    pub fn has_image(&self) -> bool {
        self.session.uploaded_image.is_some()
    }

    /// Stage a new upload, dropping (and deleting) any previous one.
    pub fn stage_image(&mut self, image: StagedImage) {
        if let Some(previous) = self.session.uploaded_image.replace(image) {
            debug!("Replacing staged upload {}", previous.name());
        }
    }

    /// Move the staged image out; the caller owns its cleanup.
    pub fn take_image(&mut self) -> Option<StagedImage> {
        self.session.uploaded_image.take()
    }

    pub fn record_result(&mut self, text: String) {
        self.session.last_result = Some(text);
    }

    pub fn clear(&mut self) {
        self.set(Session::default());
    }
}
