use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, ImageInput};
use serde::{Deserialize, Serialize};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const VISION_MAX_TOKENS: u32 = 1024;

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %model))]
    pub async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<String> {
        let req = AnthropicRequest {
            model: model.to_string(),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            system: if request.system.trim().is_empty() {
                None
            } else {
                Some(request.system.clone())
            },
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![AnthropicContentBlock::Text {
                    text: request.prompt.clone(),
                }],
            }],
        };
        self.send(&req).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %model))]
    pub async fn describe_image(
        &self,
        model: &str,
        image: &ImageInput,
        context: &str,
    ) -> Result<String> {
        let req = AnthropicRequest {
            model: model.to_string(),
            max_tokens: VISION_MAX_TOKENS,
            temperature: None,
            system: None,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![
                    AnthropicContentBlock::Image {
                        source: AnthropicImageSource {
                            kind: "base64".to_string(),
                            media_type: image.media_type.clone(),
                            data: image.base64(),
                        },
                    },
                    AnthropicContentBlock::Text {
                        text: context.to_string(),
                    },
                ],
            }],
        };
        self.send(&req).await
    }

    async fn send(&self, req: &AnthropicRequest) -> Result<String> {
        let response = self
            .http
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                endpoint: "anthropic messages",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body)?;
        parsed.into_text()
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    kind: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl AnthropicResponse {
    fn into_text(self) -> Result<String> {
        let mut text = String::new();
        for block in self.content {
            if let AnthropicContentBlock::Text { text: t } = block {
                text.push_str(&t);
            }
        }
        if text.is_empty() {
            return Err(LlmError::ResponseFormat(format!(
                "anthropic response had no text content (stop_reason={:?})",
                self.stop_reason
            )));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_blocks_are_concatenated() {
        let parsed: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"<think>a</think>"},{"type":"text","text":" done"}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_text().unwrap(), "<think>a</think> done");
    }

    #[test]
    fn empty_response_is_a_format_error() {
        let parsed: AnthropicResponse =
            serde_json::from_str(r#"{"content":[],"stop_reason":"max_tokens"}"#).unwrap();
        let err = parsed.into_text().unwrap_err();
        assert!(err.to_string().contains("no text content"));
    }

    #[test]
    fn image_block_serializes_with_base64_source() {
        let block = AnthropicContentBlock::Image {
            source: AnthropicImageSource {
                kind: "base64".to_string(),
                media_type: "image/png".to_string(),
                data: "AAAA".to_string(),
            },
        };
        let v = serde_json::to_value(&block).unwrap();
        assert_eq!(v["type"], "image");
        assert_eq!(v["source"]["type"], "base64");
        assert_eq!(v["source"]["media_type"], "image/png");
    }
}
