use async_trait::async_trait;

use super::types::{ChatRequest, ProviderModel};
use crate::core::errors::RagError;

/// A local model server able to chat and embed.
///
/// Implementations report chat failures as `RagError::Generation` and
/// embedding failures as `RagError::EmbeddingUnavailable`. Timeouts are
/// applied by [`super::LlmService`], not here.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "ollama", "openai_compatible")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, RagError>;

    /// list available models from the provider
    async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError>;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError>;

    /// one embedding per input, in input order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, RagError>;
}
