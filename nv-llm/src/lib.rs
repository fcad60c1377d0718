//! Model collaborators for the NV experiment agent.
//!
//! Pure HTTP clients: text completion, image description and text embeddings.
//! Nothing here knows about actions, transcripts or the workspace.

mod anthropic;
mod client;
mod error;
mod openai;
mod traits;
mod types;

pub use client::{LlmClient, Provider, detect_provider};
pub use error::{LlmError, Result};
pub use openai::OpenAiEmbeddingClient;
pub use traits::{Embedder, LanguageModel};
pub use types::{CompletionRequest, ImageInput, media_type_for_extension};
