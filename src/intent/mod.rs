//! Intent Resolver
//!
//! Two tiers: an LLM classifier when one is configured and answers in time,
//! then the keyword table, which always answers. Parameters (plot, day
//! window) are extracted deterministically whichever tier picked the intent.

pub mod keywords;
pub mod llm_classifier;

pub use llm_classifier::LlmIntentClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::evidence::Plot;
use crate::language::Language;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    HealthCheck,
    IrrigationAdvice,
    WeeklySummary,
    Alert,
    Unknown,
}

impl Intent {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "HEALTH_CHECK" => Some(Intent::HealthCheck),
            "IRRIGATION_ADVICE" => Some(Intent::IrrigationAdvice),
            "WEEKLY_SUMMARY" => Some(Intent::WeeklySummary),
            "ALERT" => Some(Intent::Alert),
            "UNKNOWN" => Some(Intent::Unknown),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Intent::HealthCheck => "HEALTH_CHECK",
            Intent::IrrigationAdvice => "IRRIGATION_ADVICE",
            Intent::WeeklySummary => "WEEKLY_SUMMARY",
            Intent::Alert => "ALERT",
            Intent::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentParams {
    /// Id of a known plot
    pub plot: Option<String>,
    /// Look-ahead window requested by the farmer
    pub days: Option<u32>,
}

impl IntentParams {
    pub fn for_plot(plot_id: impl Into<String>) -> Self {
        Self {
            plot: Some(plot_id.into()),
            days: None,
        }
    }

    /// Fills gaps in `self` from `other`
    fn or(self, other: IntentParams) -> IntentParams {
        IntentParams {
            plot: self.plot.or(other.plot),
            days: self.days.or(other.days),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Llm,
    Keyword,
    /// Preset by a scheduled trigger
    Preset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResolution {
    pub intent: Intent,
    pub params: IntentParams,
    pub source: IntentSource,
}

/// First-tier classifier. Any error means "unavailable" and sends the
/// resolver to the keyword table.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        language: Language,
        plots: &[Plot],
    ) -> AppResult<(Intent, IntentParams)>;
}

pub struct IntentResolver {
    classifier: Option<Arc<dyn IntentClassifier>>,
    timeout: Duration,
}

impl IntentResolver {
    pub fn new(classifier: Option<Arc<dyn IntentClassifier>>, timeout: Duration) -> Self {
        Self { classifier, timeout }
    }

    /// Keyword table only
    pub fn keywords_only() -> Self {
        Self::new(None, Duration::from_secs(0))
    }

    async fn try_classifier(
        &self,
        text: &str,
        language: Language,
        plots: &[Plot],
    ) -> AppResult<(Intent, IntentParams)> {
        let Some(classifier) = &self.classifier else {
            return Err(AppError::ClassifierUnavailable("no LLM configured".to_string()));
        };
        match tokio::time::timeout(self.timeout, classifier.classify(text, language, plots)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::ClassifierUnavailable(format!(
                "no answer within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    pub async fn resolve(&self, text: &str, language: Language, plots: &[Plot]) -> IntentResolution {
        let extracted = keywords::extract_params(text, plots);

        match self.try_classifier(text, language, plots).await {
            Ok((intent, llm_params)) => {
                debug!(intent = %intent, "Intent from LLM classifier");
                IntentResolution {
                    intent,
                    params: extracted.or(llm_params),
                    source: IntentSource::Llm,
                }
            }
            Err(e) => {
                if self.classifier.is_some() {
                    warn!(error = %e, "LLM intent classifier unavailable, using keyword fallback");
                }
                let intent = keywords::classify(text, language);
                debug!(intent = %intent, "Intent from keyword table");
                IntentResolution {
                    intent,
                    params: extracted,
                    source: IntentSource::Keyword,
                }
            }
        }
    }
}
