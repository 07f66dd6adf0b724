//! Chat-completion client with bounded transport retries.
//!
//! Talks to any OpenAI-compatible endpoint. Only transport-level failures
//! (rate limits, 5xx) are retried; model output is never regenerated on a
//! parse failure, the caller's fallback is used instead.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{PipelineError, Result};

const DEFAULT_MAX_RETRIES: u32 = 3;
const MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.0-flash-001".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: F, operation_name: &str) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut retries = 0;
        let mut backoff_ms = self.config.initial_backoff_ms;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(PipelineError::RateLimited { retry_after }) => {
                    if retries >= self.config.max_retries {
                        error!(
                            "{} failed after {} retries due to rate limiting",
                            operation_name, retries
                        );
                        return Err(PipelineError::RateLimited { retry_after });
                    }

                    let wait_ms = retry_after
                        .map(|s| s * 1000)
                        .unwrap_or(backoff_ms)
                        .min(MAX_BACKOFF_MS);

                    warn!(
                        "{} rate limited, retrying in {}ms (attempt {}/{})",
                        operation_name,
                        wait_ms,
                        retries + 1,
                        self.config.max_retries
                    );

                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                    retries += 1;
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
                Err(PipelineError::Api {
                    ref message,
                    status_code: Some(code),
                }) if code >= 500 => {
                    if retries >= self.config.max_retries {
                        error!(
                            "{} failed after {} retries due to server error: {}",
                            operation_name, retries, message
                        );
                        return Err(PipelineError::Api {
                            message: message.clone(),
                            status_code: Some(code),
                        });
                    }

                    warn!(
                        "{} server error ({}), retrying in {}ms (attempt {}/{})",
                        operation_name,
                        code,
                        backoff_ms,
                        retries + 1,
                        self.config.max_retries
                    );

                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    retries += 1;
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Generate free-form text.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let prompt = prompt.to_string();
        let system = system.map(|s| s.to_string());

        self.with_retry(
            || async { self.chat_completion_inner(&prompt, system.as_deref()).await },
            "chat_completion",
        )
        .await
    }

    /// Generate a JSON object.
    ///
    /// The raw completion is cleaned of code fences and the first balanced
    /// JSON object is extracted. If nothing parseable comes back, the
    /// fallback is returned when provided.
    pub async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        fallback: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let json_prompt = format!(
            "{prompt}\n\n\
             Respond with a single valid JSON object only. No markdown, no code \
             blocks, no text outside the object. Use double quotes, close every \
             bracket, no trailing commas. Escape backslashes in strings: LaTeX \
             like \\frac must be written \\\\frac."
        );

        let raw = self.generate(&json_prompt, system).await?;
        let cleaned = strip_code_fences(&raw);

        match extract_json_object(cleaned).and_then(|s| serde_json::from_str(s).ok()) {
            Some(serde_json::Value::Object(map)) => Ok(serde_json::Value::Object(map)),
            _ => {
                warn!(
                    "no parseable JSON object in completion (first 200 chars: {:?})",
                    cleaned.chars().take(200).collect::<String>()
                );
                fallback.ok_or_else(|| PipelineError::Api {
                    message: "No valid JSON object in completion".to_string(),
                    status_code: None,
                })
            }
        }
    }

    async fn chat_completion_inner(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        debug!(
            "chat completion with {} messages, model {}",
            messages.len(),
            self.config.model
        );

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                warn!("rate limited by LLM provider");
                return Err(PipelineError::RateLimited { retry_after: None });
            }

            return Err(PipelineError::Api {
                message: error_text,
                status_code: Some(status.as_u16()),
            });
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            PipelineError::Api {
                message: format!("Malformed completion response: {e}"),
                status_code: None,
            }
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| PipelineError::Api {
                message: "No completion returned".to_string(),
                status_code: None,
            })
    }
}

fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(stripped) = text.strip_prefix("```") else {
        return text;
    };
    let stripped = stripped.strip_prefix("json").unwrap_or(stripped);
    stripped.strip_suffix("```").unwrap_or(stripped).trim()
}

/// Extract the first balanced JSON object, respecting string literals and
/// escape sequences. LaTeX-heavy completions routinely break simple regex
/// extraction.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    fn test_client(base_url: String) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_key: "test-key".to_string(),
            base_url,
            initial_backoff_ms: 10,
            ..Default::default()
        })
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(
            extract_json_object(r#"Sure! {"answer": "x = 5"} hope it helps"#),
            Some(r#"{"answer": "x = 5"}"#)
        );
        assert_eq!(
            extract_json_object(r#"{"a": {"b": 1}, "c": "}"}"#),
            Some(r#"{"a": {"b": 1}, "c": "}"}"#)
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_extract_handles_escaped_quotes() {
        let text = r#"{"steps": ["Use \"substitution\""]}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_generate_returns_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("x = 5")))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let text = client.generate("Solve 2x + 5 = 15", None).await.unwrap();
        assert_eq!(text, "x = 5");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let text = client.generate("hi", None).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Api {
                status_code: Some(400),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_generate_json_parses_fenced_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                "```json\n{\"topic\": \"algebra\"}\n```",
            )))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let value = client.generate_json("parse this", None, None).await.unwrap();
        assert_eq!(value["topic"], "algebra");
    }

    #[tokio::test]
    async fn test_generate_json_uses_fallback_on_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("I cannot do that")),
            )
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let fallback = serde_json::json!({"topic": "general"});
        let value = client
            .generate_json("parse this", None, Some(fallback.clone()))
            .await
            .unwrap();
        assert_eq!(value, fallback);
    }

    #[tokio::test]
    async fn test_generate_json_errors_without_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("not json")),
            )
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client.generate_json("parse this", None, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Api { .. }));
    }
}
