//! Configuration for the LLM client.

use serde::{Deserialize, Serialize};

/// Configuration for the chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether LLM-backed processing is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model to use for correction and assessment
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (low for consistent corrections)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// API key, normally supplied via the PAGELIFT_API_KEY env var
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_enabled() -> bool {
    true
}
fn default_base_url() -> String {
    "https://api.venice.ai/api/v1".to_string()
}
fn default_model() -> String {
    "llama-3.3-70b".to_string()
}
fn default_max_tokens() -> u32 {
    8000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    /// Fill the API key from the environment when the config left it unset.
    pub fn with_env_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var("PAGELIFT_API_KEY").ok();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert!(config.enabled);
        assert!(config.model.contains("llama"));
        assert!(config.temperature < 0.5);
    }
}
