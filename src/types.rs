// Type definitions and enums

use crate::evidence::EvidenceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    Ollama,
    Anthropic,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Ollama => write!(f, "ollama"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl LLMProvider {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "ollama" | "local" => Some(LLMProvider::Ollama),
            "anthropic" | "cloud" => Some(LLMProvider::Anthropic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Partial or missing evidence. Never fatal; feeds the uncertainty handler.
    #[error("Evidence unavailable ({source_name}): {reason}")]
    EvidenceUnavailable {
        source_name: String,
        reason: String,
    },

    /// LLM, intent or translation collaborator down or returning garbage.
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Delivery failed after {attempts} attempt(s): {reason}")]
    DeliveryFailure { attempts: u32, reason: String },

    /// Orchestration bug. The only kind that escapes the pipeline.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn evidence_unavailable(source: EvidenceSource, reason: impl Into<String>) -> Self {
        AppError::EvidenceUnavailable {
            source_name: source.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        AppError::MalformedInput(msg.into())
    }

    /// Whether the pipeline must abort instead of degrading.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::MalformedInput(_))
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_input_is_fatal() {
        assert!(AppError::malformed("agent invoked twice").is_fatal());
        assert!(!AppError::ClassifierUnavailable("timeout".into()).is_fatal());
        assert!(!AppError::evidence_unavailable(EvidenceSource::Satellite, "no rows").is_fatal());
        assert!(!AppError::DeliveryFailure { attempts: 3, reason: "503".into() }.is_fatal());
    }

    #[test]
    fn test_provider_from_id() {
        assert_eq!(LLMProvider::from_id("ollama"), Some(LLMProvider::Ollama));
        assert_eq!(LLMProvider::from_id("Cloud"), Some(LLMProvider::Anthropic));
        assert_eq!(LLMProvider::from_id("none"), None);
    }
}
