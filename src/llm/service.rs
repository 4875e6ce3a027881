use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use super::ollama::OllamaProvider;
use super::openai_compat::OpenAiCompatibleProvider;
use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest, ProviderModel};
use crate::core::config::{LlmConfig, ProviderKind};
use crate::core::errors::RagError;

/// Chat and embedding calls against the configured provider, each bounded
/// by its timeout.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
    request_timeout: Duration,
    embed_timeout: Duration,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            provider,
            request_timeout: config.request_timeout(),
            embed_timeout: config.embed_timeout(),
            config,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| RagError::Configuration(err.to_string()))?;

        let provider: Arc<dyn LlmProvider> = match config.provider {
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(&config.base_url, client)),
            ProviderKind::OpenaiCompatible => {
                Arc::new(OpenAiCompatibleProvider::new(&config.base_url, client))
            }
        };
        Ok(Self::new(provider, config.clone()))
    }

    pub fn with_timeouts(mut self, request_timeout: Duration, embed_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.embed_timeout = embed_timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    pub async fn health_check(&self) -> bool {
        match tokio::time::timeout(self.embed_timeout, self.provider.health_check()).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(err)) => {
                tracing::debug!("Health check against {} failed: {}", self.provider.name(), err);
                false
            }
            Err(_) => false,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError> {
        tokio::time::timeout(self.embed_timeout, self.provider.list_models())
            .await
            .map_err(|_| RagError::Timeout(self.embed_timeout))?
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, RagError> {
        let request = ChatRequest::new(messages).with_config(&self.config);
        let result = tokio::time::timeout(
            self.request_timeout,
            self.provider.chat(request, &self.config.chat_model),
        )
        .await
        .map_err(|_| RagError::Timeout(self.request_timeout))?;

        match result {
            Ok(answer) if answer.trim().is_empty() => {
                Err(RagError::Generation("model returned an empty answer".to_string()))
            }
            Ok(answer) => Ok(answer),
            Err(RagError::Generation(msg)) => Err(RagError::Generation(msg)),
            Err(other) => Err(RagError::Generation(other.to_string())),
        }
    }

    /// One vector per input. A short or ragged reply is treated as the
    /// embedding service being unavailable.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let result = tokio::time::timeout(
            self.embed_timeout,
            self.provider.embed(inputs, &self.config.embedding_model),
        )
        .await
        .map_err(|_| RagError::Timeout(self.embed_timeout))?;

        let embeddings = match result {
            Ok(embeddings) => embeddings,
            Err(RagError::EmbeddingUnavailable(msg)) => return Err(RagError::EmbeddingUnavailable(msg)),
            Err(other) => return Err(RagError::EmbeddingUnavailable(other.to_string())),
        };

        if embeddings.len() != inputs.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }
        let dimension = embeddings.first().map(Vec::len).unwrap_or_default();
        if dimension == 0 || embeddings.iter().any(|vector| vector.len() != dimension) {
            return Err(RagError::EmbeddingUnavailable(
                "embeddings have inconsistent dimensions".to_string(),
            ));
        }
        Ok(embeddings)
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut embeddings = self.embed(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::EmbeddingUnavailable("no embedding returned".to_string()))
    }
}
