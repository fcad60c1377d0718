use crate::error::Result;
use crate::types::{CompletionRequest, ImageInput};
use async_trait::async_trait;

/// Text completion and image description. Treated as a black box by the agent.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    async fn describe_image(&self, image: &ImageInput, context: &str) -> Result<String>;
}

/// Maps a batch of texts to vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
