//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use medassist::gateway::{GatewayError, ImagePayload, ModelGateway};

/// What the gateway was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Image { media_type: String, bytes: Vec<u8> },
    Symptoms(String),
    FollowUp { query: String, prior_result: String },
}

enum Reply {
    Text(String),
    Fail(u16, String),
}

/// Gateway that answers from a queue of canned replies and records every call.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Text(text.to_string()));
    }

    pub fn fail(&self, status: u16, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Fail(status, message.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, call: Call) -> Result<String, GatewayError> {
        self.calls.lock().unwrap().push(call);
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(status, message)) => Err(GatewayError::from_status(status, message)),
            None => Err(GatewayError::EmptyResponse),
        }
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn analyze_image(&self, image: &ImagePayload) -> Result<String, GatewayError> {
        self.answer(Call::Image {
            media_type: image.media_type.clone(),
            bytes: image.bytes.clone(),
        })
    }

    async fn analyze_symptoms(&self, description: &str) -> Result<String, GatewayError> {
        self.answer(Call::Symptoms(description.to_string()))
    }

    async fn answer_follow_up(
        &self,
        query: &str,
        prior_result: &str,
    ) -> Result<String, GatewayError> {
        self.answer(Call::FollowUp {
            query: query.to_string(),
            prior_result: prior_result.to_string(),
        })
    }

    fn models(&self) -> (String, String) {
        ("vision-test".to_string(), "text-test".to_string())
    }
}

/// Smallest byte string that passes for a PNG upload.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-data";
