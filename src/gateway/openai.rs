use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::{
    ApiErrorBody, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart,
    ImageUrl,
};
use super::{GatewayError, ImagePayload, ModelGateway};
use crate::config::Config;
use crate::prompts::{follow_up_message, symptom_message, PromptSet};

/// OpenAI-compatible chat-completions client.
pub struct OpenAiGateway {
    client: Client,
    api_key: String,
    base_url: String,
    vision_model: String,
    text_model: String,
    max_tokens: u32,
    image_detail: String,
    prompts: PromptSet,
}

impl OpenAiGateway {
    pub fn new(
        api_key: &str,
        base_url: &str,
        config: &Config,
        prompts: PromptSet,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.model.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            vision_model: config.model.vision_model.clone(),
            text_model: config.model.text_model.clone(),
            max_tokens: config.model.max_tokens,
            image_detail: config.model.image_detail.clone(),
            prompts,
        })
    }

    /// Build from configuration; fails when the API key is missing.
    pub fn from_config(config: &Config, prompts: PromptSet) -> anyhow::Result<Self> {
        let api_key = config.api_key()?;
        Ok(Self::new(
            &api_key,
            &config.providers.openai.base_url,
            config,
            prompts,
        )?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, model: &str, messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages,
            max_tokens: Some(self.max_tokens),
        }
    }

    async fn send(&self, body: ChatCompletionRequest) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let start = Instant::now();
        debug!("POST {} model={}", url, body.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .inspect_err(|e| warn!("Model request to {} failed: {}", body.model, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| {
                    if text.is_empty() {
                        status.canonical_reason().unwrap_or("unknown error").to_string()
                    } else {
                        text
                    }
                });
            warn!("Model {} returned {}: {}", body.model, status, message);
            return Err(GatewayError::from_status(status.as_u16(), message));
        }

        let bytes = response.bytes().await?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        // Missing or null content; any text, even blank, is returned as-is
        let text = parsed.into_text().ok_or(GatewayError::EmptyResponse)?;

        info!(
            "Model {} answered in {} ms ({} chars)",
            body.model,
            start.elapsed().as_millis(),
            text.len()
        );
        Ok(text)
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn analyze_image(&self, image: &ImagePayload) -> Result<String, GatewayError> {
        let message = ChatMessage::user_parts(vec![
            ContentPart::Text {
                text: self.prompts.image.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                    detail: self.image_detail.clone(),
                },
            },
        ]);
        self.send(self.request(&self.vision_model, vec![message]))
            .await
    }

    async fn analyze_symptoms(&self, description: &str) -> Result<String, GatewayError> {
        let message = ChatMessage::user(symptom_message(&self.prompts.symptom, description));
        self.send(self.request(&self.text_model, vec![message]))
            .await
    }

    async fn answer_follow_up(
        &self,
        query: &str,
        prior_result: &str,
    ) -> Result<String, GatewayError> {
        let messages = vec![
            ChatMessage::system(self.prompts.follow_up.clone()),
            ChatMessage::user(follow_up_message(prior_result, query)),
        ];
        self.send(self.request(&self.text_model, messages)).await
    }

    fn models(&self) -> (String, String) {
        (self.vision_model.clone(), self.text_model.clone())
    }
}
