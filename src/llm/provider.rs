use async_trait::async_trait;
use std::time::Duration;

use crate::config::LLMConfig;
use crate::types::{AppResult, LLMMessage, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Connection settings for one provider (named to avoid clashing with the `LLMProvider` enum)
pub struct LLMProviderConfig {
    pub provider: LLMProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
    model: String,
}

impl LLM {
    pub fn new(config: LLMProviderConfig) -> Self {
        let adapter: Box<dyn LLMAdapter> = match config.provider {
            LLMProvider::Ollama => Box::new(crate::llm::ollama::OllamaAdapter::new(
                config.base_url.as_deref(),
                config.timeout,
            )),
            LLMProvider::Anthropic => Box::new(crate::llm::anthropic::AnthropicAdapter::new(
                &config.api_key,
                config.base_url.as_deref(),
                config.timeout,
            )),
        };

        Self {
            adapter,
            provider_name: config.provider.to_string(),
            model: config.model,
        }
    }

    /// `None` when no provider is configured or its credentials are missing
    pub fn from_config(config: &LLMConfig) -> Option<Self> {
        let provider = config.active_provider()?;
        Some(Self::new(LLMProviderConfig {
            provider,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }))
    }

    pub fn with_adapter(provider_name: &str, model: &str, adapter: Box<dyn LLMAdapter>) -> Self {
        Self {
            adapter,
            provider_name: provider_name.to_string(),
            model: model.to_string(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }

    /// Single-turn, deterministic completion with the configured model
    pub async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> AppResult<String> {
        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(prompt)],
            max_tokens: Some(max_tokens),
            temperature: Some(0.0),
            system_instruction: Some(system.to_string()),
        };
        let response = self.create_chat_completion(&request).await?;
        Ok(response.content)
    }
}
