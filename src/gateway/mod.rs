//! Boundary to the hosted model API.
//!
//! Every operation performs exactly one outbound request and surfaces any
//! failure to the caller unchanged: no retries, no caching.

pub mod error;
pub mod openai;
pub mod types;

pub use error::GatewayError;
pub use openai::OpenAiGateway;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Image,
    Symptom,
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisMode::Image => write!(f, "image"),
            AnalysisMode::Symptom => write!(f, "symptom"),
        }
    }
}

/// Raw image bytes with their media type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Inline `data:` URL with the base64-encoded bytes.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }
}

// Keep image bytes out of logs
impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisRequest {
    Image(ImagePayload),
    Symptom(String),
}

impl AnalysisRequest {
    pub fn mode(&self) -> AnalysisMode {
        match self {
            AnalysisRequest::Image(_) => AnalysisMode::Image,
            AnalysisRequest::Symptom(_) => AnalysisMode::Symptom,
        }
    }

    pub async fn dispatch(&self, gateway: &dyn ModelGateway) -> Result<String, GatewayError> {
        match self {
            AnalysisRequest::Image(image) => gateway.analyze_image(image).await,
            AnalysisRequest::Symptom(description) => gateway.analyze_symptoms(description).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpRequest {
    pub query: String,
    /// The analysis the question refers to
    pub context: String,
}

impl FollowUpRequest {
    pub async fn dispatch(&self, gateway: &dyn ModelGateway) -> Result<String, GatewayError> {
        gateway.answer_follow_up(&self.query, &self.context).await
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Image-analysis persona plus the image, sent to the vision model.
    async fn analyze_image(&self, image: &ImagePayload) -> Result<String, GatewayError>;

    /// Symptom-analysis persona plus the description, text-only.
    async fn analyze_symptoms(&self, description: &str) -> Result<String, GatewayError>;

    /// Answer a question about a previous analysis.
    async fn answer_follow_up(
        &self,
        query: &str,
        prior_result: &str,
    ) -> Result<String, GatewayError>;

    /// Model identifiers for status display: (vision, text).
    fn models(&self) -> (String, String);
}
