//! Fake provider shared by the unit tests of the crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::provider::LlmProvider;
use super::service::LlmService;
use super::types::{ChatMessage, ChatRequest, ProviderModel};
use crate::core::config::AppConfig;
use crate::core::errors::RagError;

pub(crate) const DIMENSION: usize = 64;

/// Bag-of-words embedding: texts sharing words point the same way.
pub(crate) fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for word in text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.chars().count() > 2)
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % DIMENSION as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    } else {
        vector[0] = 1.0;
    }
    vector
}

#[derive(Debug, Clone)]
pub(crate) enum ChatBehaviour {
    Reply(String),
    Fail,
    Hang,
}

pub(crate) struct FakeProvider {
    behaviour: ChatBehaviour,
    pub embed_fails: AtomicBool,
    pub chat_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeProvider {
    pub fn new(behaviour: ChatBehaviour) -> Self {
        Self {
            behaviour,
            embed_fails: AtomicBool::new(false),
            chat_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(answer: &str) -> Self {
        Self::new(ChatBehaviour::Reply(answer.to_string()))
    }

    pub fn last_prompt(&self) -> Option<Vec<ChatMessage>> {
        self.prompts.lock().ok().and_then(|prompts| prompts.last().cloned())
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        Ok(!self.embed_fails.load(Ordering::SeqCst))
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError> {
        Ok(vec![ProviderModel {
            id: "fake-chat".to_string(),
            name: "fake-chat".to_string(),
        }])
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, RagError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.messages.clone());
        }
        match &self.behaviour {
            ChatBehaviour::Reply(answer) => Ok(answer.clone()),
            ChatBehaviour::Fail => Err(RagError::Generation("model crashed".to_string())),
            ChatBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".to_string())
            }
        }
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.embed_fails.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingUnavailable("connection refused".to_string()));
        }
        Ok(inputs.iter().map(|input| hash_embedding(input)).collect())
    }
}

pub(crate) fn service(provider: Arc<FakeProvider>) -> LlmService {
    let config = AppConfig::builtin().expect("builtin config").llm;
    LlmService::new(provider, config)
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200))
}

#[tokio::test]
async fn chat_applies_configured_sampling_and_model() {
    let provider = Arc::new(FakeProvider::replying("Hello"));
    let service = service(provider.clone());
    let answer = service.chat(vec![ChatMessage::user("hi")]).await.unwrap();
    assert_eq!(answer, "Hello");
    assert_eq!(service.chat_model(), "llama3.2");
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hanging_chat_times_out() {
    let service = service(Arc::new(FakeProvider::new(ChatBehaviour::Hang)));
    let err = service.chat(vec![ChatMessage::user("hi")]).await.unwrap_err();
    assert!(matches!(err, RagError::Timeout(_)));
}

#[tokio::test]
async fn empty_answer_is_a_generation_failure() {
    let service = service(Arc::new(FakeProvider::replying("   ")));
    let err = service.chat(vec![ChatMessage::user("hi")]).await.unwrap_err();
    assert!(matches!(err, RagError::Generation(_)));
}

#[tokio::test]
async fn embedding_outage_is_reported() {
    let provider = Arc::new(FakeProvider::replying("unused"));
    provider.embed_fails.store(true, Ordering::SeqCst);
    let service = service(provider);
    let err = service.embed(&["margherita".to_string()]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    assert!(!service.health_check().await);
}

#[tokio::test]
async fn embeddings_match_inputs() {
    let service = service(Arc::new(FakeProvider::replying("unused")));
    let inputs = vec!["tomato mozzarella".to_string(), "garlic oregano".to_string()];
    let embeddings = service.embed(&inputs).await.unwrap();
    assert_eq!(embeddings.len(), 2);
    assert!(embeddings.iter().all(|vector| vector.len() == DIMENSION));
    assert!(service.embed(&[]).await.unwrap().is_empty());
}

#[test]
fn hash_embedding_is_unit_length() {
    let vector = hash_embedding("Margherita tomato mozzarella basil");
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}
