use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::{ChatRequest, ProviderModel};
use crate::core::errors::RagError;

/// Servers speaking the OpenAI REST dialect (LM Studio, llama.cpp server,
/// vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError> {
        let url = format!("{}/v1/models", self.base_url);
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

        let response: ModelsResponse = res
            .json()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        Ok(response
            .data
            .into_iter()
            .map(|m| ProviderModel {
                name: m.id.clone(),
                id: m.id,
            })
            .collect())
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.top_p { obj.insert("top_p".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
            if let Some(s) = request.stop { obj.insert("stop".to_string(), json!(s)); }
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!("chat completion error: {}", text)));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RagError::Generation("response carried no message content".to_string()))
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/v1/embeddings", self.base_url);

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
            return Err(RagError::EmbeddingUnavailable(format!("embeddings error: {}", text)));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| RagError::EmbeddingUnavailable(err.to_string()))?;

        Ok(parse_embedding_rows(payload["data"].as_array().map(|rows| {
            rows.iter().map(|item| &item["embedding"]).collect::<Vec<_>>()
        })))
    }
}

pub(crate) fn parse_embedding_rows(rows: Option<Vec<&Value>>) -> Vec<Vec<f32>> {
    rows.unwrap_or_default()
        .into_iter()
        .filter_map(Value::as_array)
        .map(|vals| vals.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_rows_are_read_in_order() {
        let payload = json!({
            "data": [
                { "index": 0, "embedding": [0.5, -1.0] },
                { "index": 1, "embedding": [0.25, 2.0] }
            ]
        });
        let rows = payload["data"]
            .as_array()
            .map(|rows| rows.iter().map(|item| &item["embedding"]).collect::<Vec<_>>());
        assert_eq!(parse_embedding_rows(rows), vec![vec![0.5, -1.0], vec![0.25, 2.0]]);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatibleProvider::new("http://localhost:1234/", Client::new());
        assert_eq!(provider.base_url, "http://localhost:1234");
    }
}
