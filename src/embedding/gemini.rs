//! Gemini embedding endpoint client, same request shape as
//! [`crate::llm::gemini`] but targeting `embedContent`.

use super::{Embedder, EmbeddingError};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct GeminiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:embedContent?key={}",
            self.model, self.api_key
        )
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = json!({ "content": { "parts": [{ "text": text }] } });
        let response = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Permanent(format!(
                "embedding request failed: {}",
                response.status()
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Permanent(e.to_string()))?;

        let values = value["embedding"]["values"]
            .as_array()
            .ok_or_else(|| EmbeddingError::Permanent("no embedding values in response".to_string()))?;

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbeddingError::Permanent("non-numeric embedding value".to_string()))
            })
            .collect()
    }
}
