//! LLM chat client for OCR correction and quality classification.
//!
//! Talks to any OpenAI-compatible chat-completions endpoint. The `ChatClient`
//! trait is the seam the engines depend on; tests substitute scripted
//! implementations.

mod client;
mod config;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpChatClient;
pub use config::LlmConfig;

/// One chat message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
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

/// A completed chat call with token usage for cost accounting.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Failed to connect to the LLM service
    #[error("Connection error: {0}")]
    Connection(String),
    /// API returned an error
    #[error("API error: {0}")]
    Api(String),
    /// 429-class response. `daily` distinguishes a daily-quota exhaustion
    /// (the whole run must stop) from a transient burst limit.
    #[error("Rate limited (daily quota: {daily})")]
    RateLimited { daily: bool },
    /// Failed to parse the response body
    #[error("Parse error: {0}")]
    Parse(String),
    /// LLM is disabled in configuration
    #[error("LLM is disabled")]
    Disabled,
}

/// Chat completion backend.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a conversation and return the assistant's reply.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<ChatResponse, LlmError>;

    /// Model identifier used for pricing and record keeping.
    fn model(&self) -> &str;
}
