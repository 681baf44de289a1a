//! Chat-completion client for an OpenAI-compatible endpoint.
//!
//! Rate-limited requests are retried with exponential backoff, capped at
//! three attempts. Everything else is terminal for the request.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm api key not configured")]
    MissingApiKey,
    #[error("llm rate limited, retry after {0}s")]
    RateLimited(u64),
    #[error("llm authentication failed: {0}")]
    Unauthorized(String),
    #[error("llm request failed: {0}")]
    Api(String),
    #[error("llm transport error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
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

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

/// Completed chat response with token accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmClient {
    /// Build a client from the `[llm]` config section. Returns
    /// `MissingApiKey` when neither the config nor the environment carries
    /// a key.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ATELIERD_LLM_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion with retry on rate limiting.
    pub async fn complete(&self, messages: &[Message]) -> LlmResult<Completion> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send_request(messages).await {
                Ok(completion) => return Ok(completion),
                Err(LlmError::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(attempt = attempts, wait_ms = backoff, "rate limited, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_request(&self, messages: &[Message]) -> LlmResult<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, messages = messages.len(), "sending chat completion request");

        let request = ChatRequest {
            model: &self.model,
            messages,
        };
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::Unauthorized(
                    "invalid API key; check [llm].api_key or ATELIERD_LLM_API_KEY".to_string(),
                ),
                429 => LlmError::RateLimited(extract_retry_after(&body).unwrap_or(60)),
                500..=599 => LlmError::Api(format!("server error ({status}): {body}")),
                _ => LlmError::Api(format!("HTTP {status}: {body}")),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Api(format!("failed to parse response: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Api("empty response from API".to_string()))?;
        let usage = chat.usage.unwrap_or_default();

        Ok(Completion {
            content,
            model: self.model.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

fn calculate_backoff(attempt: u32, server_wait_secs: u64) -> u64 {
    let exponential = BACKOFF_BASE_MS * 2u64.pow(attempt - 1);
    exponential.max(server_wait_secs * 1000).min(30_000)
}

/// Pull a retry hint out of a 429 body when the server provides one.
fn extract_retry_after(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("retry_after"))
        .or_else(|| value.get("retry_after"))
        .and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth() {
        assert_eq!(calculate_backoff(1, 0), 1000);
        assert_eq!(calculate_backoff(2, 0), 2000);
        assert_eq!(calculate_backoff(3, 0), 4000);
        // Server hint dominates when larger
        assert_eq!(calculate_backoff(1, 10), 10_000);
        // Capped
        assert_eq!(calculate_backoff(3, 600), 30_000);
    }

    #[test]
    fn test_extract_retry_after() {
        assert_eq!(extract_retry_after(r#"{"retry_after": 12}"#), Some(12));
        assert_eq!(
            extract_retry_after(r#"{"error": {"retry_after": 7}}"#),
            Some(7)
        );
        assert_eq!(extract_retry_after("not json"), None);
        assert_eq!(extract_retry_after("{}"), None);
    }

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        // Only meaningful when the env fallback is absent
        if std::env::var("ATELIERD_LLM_API_KEY").is_err() {
            assert!(matches!(
                LlmClient::from_config(&config),
                Err(LlmError::MissingApiKey)
            ));
        }
    }
}
