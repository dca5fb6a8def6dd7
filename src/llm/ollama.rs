// Ollama adapter for a locally hosted model
// API Reference: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";

pub struct OllamaAdapter {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

impl OllamaAdapter {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url
                .unwrap_or(OLLAMA_DEFAULT_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn build_request(request: &LLMRequest) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OllamaMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }));

        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };

        OllamaChatRequest {
            model: request.model.clone(),
            messages,
            stream: false,
            options,
        }
    }
}

#[async_trait]
impl LLMAdapter for OllamaAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&Self::build_request(request))
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_response) = serde_json::from_str::<OllamaErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "Ollama error ({}): {}",
                    status, error_response.error
                )));
            }
            return Err(AppError::LLMApi(format!("Ollama error ({}): {}", status, error_text)));
        }

        let ollama_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Ollama response: {}", e)))?;

        let prompt_tokens = ollama_response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = ollama_response.eval_count.unwrap_or(0);

        Ok(LLMResponse {
            content: ollama_response.message.content,
            finish_reason: ollama_response.done_reason.unwrap_or_else(|| "stop".to_string()),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMMessage;

    fn request() -> LLMRequest {
        LLMRequest {
            model: "llama3.2:latest".to_string(),
            messages: vec![LLMMessage::user("Is Thurpu healthy?")],
            max_tokens: Some(64),
            temperature: Some(0.0),
            system_instruction: Some("Classify the intent.".to_string()),
        }
    }

    #[test]
    fn test_system_instruction_becomes_first_message() {
        let body = OllamaAdapter::build_request(&request());
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].role, "user");
        assert!(!body.stream);
    }

    #[tokio::test]
    async fn test_chat_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"model":"llama3.2","message":{"role":"assistant","content":"{\"intent\":\"HEALTH_CHECK\"}"},
                    "done":true,"done_reason":"stop","prompt_eval_count":20,"eval_count":8}"#,
            )
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(Some(&server.url()), Duration::from_secs(5));
        let response = adapter.create_chat_completion(&request()).await.unwrap();

        mock.assert_async().await;
        assert!(response.content.contains("HEALTH_CHECK"));
        assert_eq!(response.usage.total_tokens, 28);
    }

    #[tokio::test]
    async fn test_error_status_is_llm_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model 'llama3.2' not found"}"#)
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(Some(&server.url()), Duration::from_secs(5));
        let err = adapter.create_chat_completion(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::LLMApi(ref msg) if msg.contains("not found")));
    }
}
