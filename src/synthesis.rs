//! Answer synthesis over an OpenAI-compatible chat-completions endpoint.
//!
//! The service is an external collaborator: a pure function from the
//! assembled payload to answer text, with its own latency and failure
//! modes. Failures surface immediately as [`SynthesisError`]; no automatic
//! retry, no backoff loop. The user retries by resubmitting.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::SynthesisConfig;
use crate::prompt::ChatMessage;

#[derive(Debug)]
pub enum SynthesisError {
    /// The request exceeded the configured timeout.
    Timeout,
    /// HTTP 429 from the service.
    RateLimited(String),
    /// Any other non-success response.
    Api { status: u16, message: String },
    /// The service answered 200 but without usable text.
    EmptyResponse,
    /// Connection-level failure.
    Transport(String),
}

impl std::fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthesisError::Timeout => write!(f, "answer service timed out"),
            SynthesisError::RateLimited(msg) => {
                write!(f, "answer service rate-limited the request: {}", msg)
            }
            SynthesisError::Api { status, message } => {
                write!(f, "answer service error {}: {}", status, message)
            }
            SynthesisError::EmptyResponse => write!(f, "answer service returned no text"),
            SynthesisError::Transport(msg) => write!(f, "answer service unreachable: {}", msg),
        }
    }
}

impl std::error::Error for SynthesisError {}

/// Boundary trait for the hosted completion service. Kept as a seam so the
/// chat flow can be exercised against a fake in tests.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Generate answer text from an ordered list of role-tagged messages.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SynthesisError>;
}

/// Production client for `POST {base_url}/chat/completions`.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
}

impl ChatCompletionClient {
    /// Errors if the API key env var named in config is unset.
    pub fn from_config(config: &SynthesisConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SynthesisClient for ChatCompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SynthesisError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout
                } else {
                    SynthesisError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let message = response.text().await.unwrap_or_default();
            return Err(SynthesisError::RateLimited(message));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SynthesisError::Transport(e.to_string()))?;
        extract_answer_text(&json)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn extract_answer_text(json: &serde_json::Value) -> Result<String, SynthesisError> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .unwrap_or("");

    let answer = content.trim();
    if answer.is_empty() {
        return Err(SynthesisError::EmptyResponse);
    }
    Ok(answer.to_string())
}
