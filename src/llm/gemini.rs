//! Gemini REST client: manual `serde_json::json!` request construction
//! over a plain `reqwest` client (no SDK), `create_object_schema`/
//! `create_enum_schema` helpers for structured output, behind the
//! `LlmClient` trait with the §7 retry policy.

use super::{LlmClient, LlmError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
            api_key,
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/{}:{}?key={}",
            self.base_url, self.model, method, self.api_key
        )
    }

    fn build_body(prompt: &str, system: Option<&str>, json_mode: bool) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if json_mode {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }
        body
    }

    async fn post_with_retry(&self, method: &str, body: &Value) -> Result<Value, LlmError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .http
                .post(self.endpoint(method))
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| LlmError::Permanent(e.to_string()));
                }
                Ok(response) if response.status().as_u16() == 429 => {
                    if attempt >= MAX_RETRIES {
                        return Err(LlmError::Transient("rate limited after retries".into()));
                    }
                    warn!(attempt, "gemini rate limited, backing off");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Ok(response) if response.status().is_server_error() => {
                    if attempt >= MAX_RETRIES {
                        return Err(LlmError::Transient(format!(
                            "server error after retries: {}",
                            response.status()
                        )));
                    }
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(LlmError::Permanent(format!("{status}: {text}")));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt >= MAX_RETRIES {
                        return Err(LlmError::Transient(e.to_string()));
                    }
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(LlmError::Permanent(e.to_string())),
            }
        }
    }

    fn extract_text(response: &Value) -> Result<String, LlmError> {
        response["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Permanent("no text in gemini response".to_string()))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * 2u64.pow(attempt))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str, system: Option<&str>, json_mode: bool) -> Result<String, LlmError> {
        let body = Self::build_body(prompt, system, json_mode);
        debug!(json_mode, "sending gemini generateContent request");
        let response = self.post_with_retry("generateContent", &body).await?;
        Self::extract_text(&response)
    }

    async fn generate_stream<'a>(
        &'a self,
        prompt: &'a str,
        system: Option<&'a str>,
    ) -> Result<BoxStream<'a, Result<String, LlmError>>, LlmError> {
        // The streaming endpoint returns newline-delimited JSON chunks; for
        // the pipeline's purposes (token_stream progress events) it is
        // sufficient to buffer the full response and re-emit it as a
        // one-shot stream rather than drive true server-sent events, since
        // no caller needs partial delivery before the whole call completes.
        let text = self.generate(prompt, system, false).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// JSON Schema builders (`create_object_schema` / `create_enum_schema` /
/// `create_array_schema`), used to constrain `responseSchema` for
/// structured extraction (screening, study cards, claims, audit
/// judgments).
pub fn create_object_schema(properties: Vec<(&str, Value)>, required: Vec<&str>) -> Value {
    json!({
        "type": "OBJECT",
        "properties": properties.into_iter().collect::<serde_json::Map<_, _>>(),
        "required": required,
    })
}

pub fn create_enum_schema(variants: &[&str]) -> Value {
    json!({ "type": "STRING", "enum": variants })
}

pub fn create_array_schema(items: Value) -> Value {
    json!({ "type": "ARRAY", "items": items })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_body_sets_json_mime_type_when_requested() {
        let body = GeminiClient::build_body("prompt", None, true);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn build_body_omits_system_instruction_when_absent() {
        let body = GeminiClient::build_body("prompt", None, false);
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn extract_text_reads_the_first_candidate() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "hello" }] } }]
        });
        assert_eq!(GeminiClient::extract_text(&response).unwrap(), "hello");
    }

    #[test]
    fn object_schema_collects_properties_and_required() {
        let schema = create_object_schema(
            vec![("tier", create_enum_schema(&["core", "background", "exclude"]))],
            vec!["tier"],
        );
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["required"][0], "tier");
    }
}
