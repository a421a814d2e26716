use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::base::{ChatMessage, CompletionLLM, GenerationConfig, LLMError};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

/// Non-streaming client for any server exposing `/v1/chat/completions`.
pub struct OpenAICompatibleChat {
    client: Client,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl OpenAICompatibleChat {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Self {
        OpenAICompatibleChat {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }

    fn build_payload(&self, system_prompt: &str, history: &[ChatMessage], gen_conf: &GenerationConfig) -> serde_json::Value {
        let mut messages = vec![json!({"role": "system", "content": system_prompt})];
        messages.extend(
            history
                .iter()
                .map(|message| json!({"role": message.role, "content": message.content})),
        );

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": gen_conf.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = gen_conf.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }
}

#[async_trait]
impl CompletionLLM for OpenAICompatibleChat {
    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        gen_conf: &GenerationConfig,
    ) -> Result<String, LLMError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = self.build_payload(system_prompt, history, gen_conf);

        let mut request = self.client.post(url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LLMError::RequestFailed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LLMError::RequestFailed(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LLMError::RateLimited(body));
        }
        if !status.is_success() {
            return Err(LLMError::UnexpectedStatus {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| LLMError::UnexpectedResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LLMError::UnexpectedResponse("response contained no choices".to_string()))
    }
}
