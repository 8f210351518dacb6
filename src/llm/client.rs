//! HTTP chat client for OpenAI-compatible endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatClient, ChatMessage, ChatResponse, LlmConfig, LlmError};

/// Chat completions request format.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Chat completions response format.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

/// LLM client for OpenAI-compatible chat completions.
pub struct HttpChatClient {
    config: LlmConfig,
    client: Client,
}

impl HttpChatClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Classify a 429 body: daily-quota exhaustion stops the whole run,
    /// a burst limit only defers the current page.
    fn is_daily_limit(body: &str) -> bool {
        let lower = body.to_lowercase();
        lower.contains("daily") || lower.contains("per day") || lower.contains("quota")
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<ChatResponse, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!("Chat completion request to {} ({})", url, self.config.model);

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited {
                daily: Self::is_daily_limit(&body),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let completion: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::Parse("Response contained no choices".to_string()))?;

        let usage = completion.usage.unwrap_or_default();

        Ok(ChatResponse {
            text,
            model: completion.model.unwrap_or_else(|| self.config.model.clone()),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_limit_detection() {
        assert!(HttpChatClient::is_daily_limit(
            r#"{"error": "Daily request limit exceeded"}"#
        ));
        assert!(HttpChatClient::is_daily_limit(
            r#"{"error": "You have exhausted your quota"}"#
        ));
        assert!(!HttpChatClient::is_daily_limit(
            r#"{"error": "Too many requests, slow down"}"#
        ));
    }
}
