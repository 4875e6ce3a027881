use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::openai_compat::parse_embedding_rows;
use super::provider::LlmProvider;
use super::types::{ChatRequest, ProviderModel};
use crate::core::errors::RagError;

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    model: Option<String>,
}

fn options(request: &ChatRequest) -> Value {
    let mut options = json!({});
    if let Some(obj) = options.as_object_mut() {
        if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
        if let Some(t) = request.top_p { obj.insert("top_p".to_string(), json!(t)); }
        if let Some(t) = request.max_tokens { obj.insert("num_predict".to_string(), json!(t)); }
        if let Some(s) = &request.stop { obj.insert("stop".to_string(), json!(s)); }
    }
    options
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        if !res.status().is_success() {
            return Err(RagError::Generation(format!(
                "Failed to list models: {}",
                res.status()
            )));
        }

        let tags: TagsResponse = res
            .json()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        Ok(tags
            .models
            .into_iter()
            .map(|entry| ProviderModel {
                id: entry.model.unwrap_or_else(|| entry.name.clone()),
                name: entry.name,
            })
            .collect())
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": false,
            "options": options(&request),
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!("Ollama chat error: {}", text)));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        payload["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RagError::Generation("Ollama response carried no message".to_string()))
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| RagError::EmbeddingUnavailable(err.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingUnavailable(format!(
                "Ollama embed error: {}",
                text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| RagError::EmbeddingUnavailable(err.to_string()))?;

        Ok(parse_embedding_rows(
            payload["embeddings"]
                .as_array()
                .map(|rows| rows.iter().collect()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn sampling_parameters_become_options() {
        let mut request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        request.temperature = Some(0.5);
        request.max_tokens = Some(300);
        let options = options(&request);
        assert_eq!(options["temperature"], json!(0.5));
        assert_eq!(options["num_predict"], json!(300));
        assert!(options.get("top_p").is_none());
    }
}
