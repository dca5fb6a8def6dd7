use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::delivery::Channel;
use crate::evidence::{EvidenceSource, EvidenceStore};
use crate::intent::Intent;
use crate::language::Language;
use crate::pipeline::{PipelineHandle, RequestContext};
use crate::scheduler::{Scheduler, TriggerReport};
use crate::uncertainty::Outcome;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
    pub store: Arc<dyn EvidenceStore>,
    pub config: Config,
    /// Also serves manual triggers when the timers are off
    pub scheduler: Scheduler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Plot picked in the UI, used when the text names none
    pub plot_id: Option<String>,
    pub channel: Option<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Advisory,
    Alert,
    ClarifyingQuestion,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub request_id: Uuid,
    pub content: String,
    pub language: Language,
    pub intent: Option<Intent>,
    pub plot_id: Option<String>,
    pub kind: ResponseKind,
    pub confidence: Option<f64>,
    pub missing_evidence: Vec<EvidenceSource>,
    pub degraded: bool,
    pub response_time: u64,
}

impl ChatResponse {
    pub fn from_context(ctx: &RequestContext, response_time: u64) -> Self {
        let kind = match ctx.outcome.get() {
            Some(outcome) if outcome.is_alert() => ResponseKind::Alert,
            Some(Outcome::Advisory { .. }) => ResponseKind::Advisory,
            Some(Outcome::ClarifyingQuestion { .. }) => ResponseKind::ClarifyingQuestion,
            None => ResponseKind::Message,
        };
        let aggregate = ctx.aggregate.get();
        Self {
            request_id: ctx.request_id,
            content: ctx.formatted.get().cloned().unwrap_or_default(),
            language: ctx.reply_language(),
            intent: ctx.intent.get().map(|r| r.intent),
            plot_id: ctx.plot.get().map(|p| p.id.clone()),
            kind,
            confidence: aggregate.map(|d| d.aggregate_confidence),
            missing_evidence: aggregate
                .map(|d| d.missing_evidence.iter().copied().collect())
                .unwrap_or_default(),
            degraded: ctx.degraded,
            response_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub plots: usize,
    pub llm: String,
    pub scheduler: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub kind: String,
    pub reports: Vec<TriggerReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
