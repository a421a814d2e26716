use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Provider failures. The rendered message is what the retry classifier inspects, so
/// variants keep the service's own wording.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LLMError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("rate_limit: {0}")]
    RateLimited(String),
    #[error("Service returned status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// A chat completion backend. Implementations must be cancel-safe: the caller aborts the
/// future when an attempt times out.
#[async_trait]
pub trait CompletionLLM: Send + Sync {
    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        gen_conf: &GenerationConfig,
    ) -> Result<String, LLMError>;
}
