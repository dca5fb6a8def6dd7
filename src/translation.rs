//! Translation collaborator
//!
//! Advisory text is composed in English and translated into the other
//! language at the TRANSLATE stage. [`IdempotentTranslator`] guards every
//! translator so text already in the target language passes through
//! untouched.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::language::{Language, LanguageClassifier};
use crate::llm::LLM;
use crate::types::{AppError, AppResult};

#[async_trait]
pub trait Translator: Send + Sync {
    /// Any error means the translator is unavailable.
    async fn translate(&self, text: &str, target: Language) -> AppResult<String>;
}

pub struct IdempotentTranslator {
    inner: Option<Arc<dyn Translator>>,
    classifier: LanguageClassifier,
}

impl IdempotentTranslator {
    pub fn new(inner: Option<Arc<dyn Translator>>, classifier: LanguageClassifier) -> Self {
        Self { inner, classifier }
    }
}

#[async_trait]
impl Translator for IdempotentTranslator {
    async fn translate(&self, text: &str, target: Language) -> AppResult<String> {
        let target = target.outbound();
        let detected = self.classifier.dominant(text);
        if detected == target || detected == Language::Unknown {
            debug!(target = %target, "Text already in target language, skipping translation");
            return Ok(text.to_string());
        }
        match &self.inner {
            Some(inner) => inner.translate(text, target).await,
            None => Err(AppError::ClassifierUnavailable("no translator configured".to_string())),
        }
    }
}

/// Translates through the configured LLM
pub struct LlmTranslator {
    llm: Arc<LLM>,
    classifier: LanguageClassifier,
}

impl LlmTranslator {
    pub fn new(llm: Arc<LLM>) -> Self {
        Self {
            llm,
            classifier: LanguageClassifier::default(),
        }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, target: Language) -> AppResult<String> {
        let language_name = match target.outbound() {
            Language::Secondary => "Telugu",
            _ => "English",
        };
        let system = format!(
            "You translate crop advisories for farmers into simple, natural {}. \
             Keep numbers, percentages, dates and plot names exactly as given. \
             Reply with the translation only.",
            language_name
        );
        let translated = self
            .llm
            .complete(&system, text, 1024)
            .await
            .map_err(|e| AppError::ClassifierUnavailable(format!("translation failed: {}", e)))?;

        let translated = translated.trim().to_string();
        if translated.is_empty() || self.classifier.dominant(&translated) != target.outbound() {
            return Err(AppError::ClassifierUnavailable(format!(
                "translator did not return {} text",
                language_name
            )));
        }
        Ok(translated)
    }
}
