use crate::anthropic::AnthropicClient;
use crate::error::{LlmError, Result};
use crate::openai::{OPENAI_BASE_URL, OpenAiClient};
use crate::traits::LanguageModel;
use crate::types::{CompletionRequest, ImageInput};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI or any endpoint speaking its chat completions dialect.
    OpenAiCompatible,
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "openai_compatible",
            Self::Anthropic => "anthropic",
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    provider: Provider,
    api_key: String,
    model: String,
    vision_api_key: String,
    vision_model: String,
    base_url: String,
    client: reqwest::Client,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        api_key: &str,
        model: &str,
        vision_model: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(LlmError::InvalidInput("model is required".to_string()));
        }
        let provider = detect_provider(model);
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey(provider.as_str().to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Ok(Self {
            provider,
            api_key: api_key.to_string(),
            model: model.to_string(),
            vision_api_key: api_key.to_string(),
            vision_model: vision_model.to_string(),
            base_url: base_url.unwrap_or(OPENAI_BASE_URL).to_string(),
            client,
        })
    }

    /// Key for the vision model when it belongs to a different provider.
    pub fn with_vision_api_key(mut self, key: &str) -> Self {
        if !key.trim().is_empty() {
            self.vision_api_key = key.to_string();
        }
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        match self.provider {
            Provider::OpenAiCompatible => {
                let c = OpenAiClient::new(self.client.clone(), &self.api_key, &self.base_url);
                c.complete(&self.model, request).await
            }
            Provider::Anthropic => {
                let c = AnthropicClient::new(self.client.clone(), &self.api_key);
                c.complete(&self.model, request).await
            }
        }
    }

    async fn describe_image(&self, image: &ImageInput, context: &str) -> Result<String> {
        // Routed by the vision model's name, which may differ from the text model.
        match detect_provider(&self.vision_model) {
            Provider::OpenAiCompatible => {
                let c =
                    OpenAiClient::new(self.client.clone(), &self.vision_api_key, &self.base_url);
                c.describe_image(&self.vision_model, image, context).await
            }
            Provider::Anthropic => {
                let c = AnthropicClient::new(self.client.clone(), &self.vision_api_key);
                c.describe_image(&self.vision_model, image, context).await
            }
        }
    }
}

pub fn detect_provider(model: &str) -> Provider {
    let m = model.to_ascii_lowercase();
    if m.starts_with("claude-") {
        return Provider::Anthropic;
    }
    Provider::OpenAiCompatible
}
