use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    /// Any server exposing `/v1/models`, `/v1/chat/completions` and `/v1/embeddings`.
    OpenaiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub embed_timeout_secs: u64,
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllergenConfig {
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub min_text_chars: usize,
    pub ocr_enabled: bool,
    pub ocr_language: String,
    pub ocr_dpi: u32,
    pub ocr_timeout_secs: u64,
}

impl ExtractionConfig {
    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub documents_dir: Option<String>,
    #[serde(default)]
    pub processed_dir: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub allergens: AllergenConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Built-in defaults with no file applied.
    pub fn builtin() -> Result<Self, RagError> {
        Self::from_value(super::defaults::default_config())
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, RagError> {
        serde_json::from_value(value).map_err(|err| RagError::Configuration(err.to_string()))
    }
}
