use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use super::{Intent, IntentClassifier, IntentParams};
use crate::evidence::Plot;
use crate::language::Language;
use crate::llm::LLM;
use crate::types::{AppError, AppResult};

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid JSON pattern"));

const SYSTEM_PROMPT: &str = "You classify messages from farmers who write in English or Telugu. \
Reply with one JSON object and nothing else.";

#[derive(Debug, Deserialize)]
struct IntentReply {
    intent: String,
    #[serde(default)]
    plot: Option<String>,
    #[serde(default)]
    days: Option<u32>,
}

/// First-tier intent classifier backed by the configured LLM
pub struct LlmIntentClassifier {
    llm: Arc<LLM>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<LLM>) -> Self {
        Self { llm }
    }

    fn prompt(text: &str, language: Language, plots: &[Plot]) -> String {
        let plot_list: Vec<String> = plots
            .iter()
            .map(|p| format!("{} ({} / {})", p.id, p.name_english, p.name_telugu))
            .collect();
        format!(
            "Intents:\n\
             - HEALTH_CHECK: how is the crop, show status, satellite report\n\
             - IRRIGATION_ADVICE: should I water, when to irrigate\n\
             - WEEKLY_SUMMARY: how did the week go, trends\n\
             - ALERT: anything wrong, warnings\n\
             - UNKNOWN: anything else\n\n\
             Known plots: {}\n\
             Message language: {}\n\
             Message: {}\n\n\
             Answer as {{\"intent\": \"...\", \"plot\": \"<plot id or null>\", \"days\": <number or null>}}",
            plot_list.join(", "),
            language,
            text
        )
    }

    fn parse(reply: &str, plots: &[Plot]) -> AppResult<(Intent, IntentParams)> {
        let json = JSON_OBJECT
            .find(reply)
            .ok_or_else(|| AppError::ClassifierUnavailable("LLM reply contained no JSON".to_string()))?;
        let parsed: IntentReply = serde_json::from_str(json.as_str())
            .map_err(|e| AppError::ClassifierUnavailable(format!("LLM reply was not valid JSON: {}", e)))?;
        let intent = Intent::from_label(&parsed.intent).ok_or_else(|| {
            AppError::ClassifierUnavailable(format!("LLM returned unknown intent '{}'", parsed.intent))
        })?;

        // Only ids of plots that actually exist are trusted
        let plot = parsed
            .plot
            .map(|p| p.trim().to_lowercase())
            .filter(|p| plots.iter().any(|known| known.id == *p));

        Ok((
            intent,
            IntentParams {
                plot,
                days: parsed.days.filter(|d| *d > 0),
            },
        ))
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(
        &self,
        text: &str,
        language: Language,
        plots: &[Plot],
    ) -> AppResult<(Intent, IntentParams)> {
        let reply = self
            .llm
            .complete(SYSTEM_PROMPT, &Self::prompt(text, language, plots), 128)
            .await
            .map_err(|e| AppError::ClassifierUnavailable(e.to_string()))?;
        Self::parse(&reply, plots)
    }
}
