use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::PipelineStage;
use crate::agents::AgentOpinion;
use crate::coordinator::AdvisoryDraft;
use crate::delivery::Channel;
use crate::evidence::{EvidenceSet, Plot};
use crate::intent::{IntentParams, IntentResolution, IntentSource};
use crate::language::Language;
use crate::messages::BilingualText;
use crate::scheduler::ScheduleKind;
use crate::types::{AppError, AppResult};
use crate::uncertainty::{DecisionMode, Outcome};

/// A field that may be written once per pipeline pass
#[derive(Debug, Clone)]
pub struct WriteOnce<T> {
    field: &'static str,
    value: Option<T>,
}

impl<T> WriteOnce<T> {
    pub const fn new(field: &'static str) -> Self {
        Self { field, value: None }
    }

    pub fn set(&mut self, value: T) -> AppResult<()> {
        if self.value.is_some() {
            return Err(AppError::malformed(format!("{} written twice in one pass", self.field)));
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Reads a field an earlier stage must have written
    pub fn require(&self) -> AppResult<&T> {
        self.value
            .as_ref()
            .ok_or_else(|| AppError::malformed(format!("{} read before it was written", self.field)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Interactive { channel: Channel },
    Scheduled { kind: ScheduleKind, channel: Channel },
}

impl Trigger {
    pub fn channel(&self) -> Channel {
        match self {
            Trigger::Interactive { channel } | Trigger::Scheduled { channel, .. } => *channel,
        }
    }

    pub fn mode(&self) -> DecisionMode {
        match self {
            Trigger::Interactive { .. } => DecisionMode::Interactive,
            Trigger::Scheduled { .. } => DecisionMode::Scheduled,
        }
    }
}

/// Content produced by EXECUTE_ACTION, before translation
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// English text that still needs its translation
    Compose(String),
    /// Already available in both languages
    Catalog(BilingualText),
}

/// State threaded through the stages of one request or trigger
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub trigger: Trigger,
    pub received_at: DateTime<Utc>,
    pub raw_text: String,
    /// Plot chosen outside the text, e.g. a UI selector
    pub plot_hint: Option<String>,
    pub detected_language: WriteOnce<Language>,
    pub intent: WriteOnce<IntentResolution>,
    pub plot: WriteOnce<Plot>,
    pub evidence: WriteOnce<EvidenceSet>,
    agent_opinions: Vec<AgentOpinion>,
    pub aggregate: WriteOnce<AdvisoryDraft>,
    pub outcome: WriteOnce<Outcome>,
    pub content: WriteOnce<MessageBody>,
    pub final_message: WriteOnce<BilingualText>,
    pub formatted: WriteOnce<String>,
    stages_run: Vec<PipelineStage>,
    /// Set when a stage failed and a fallback message was sent instead
    pub degraded: bool,
    pub notes: Vec<String>,
}

impl RequestContext {
    fn blank(trigger: Trigger, raw_text: String) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            trigger,
            received_at: Utc::now(),
            raw_text,
            plot_hint: None,
            detected_language: WriteOnce::new("detected_language"),
            intent: WriteOnce::new("intent"),
            plot: WriteOnce::new("plot"),
            evidence: WriteOnce::new("evidence"),
            agent_opinions: Vec::new(),
            aggregate: WriteOnce::new("aggregate"),
            outcome: WriteOnce::new("outcome"),
            content: WriteOnce::new("content"),
            final_message: WriteOnce::new("final_message"),
            formatted: WriteOnce::new("formatted"),
            stages_run: Vec::new(),
            degraded: false,
            notes: Vec::new(),
        }
    }

    /// A farmer's message
    pub fn interactive(text: impl Into<String>, channel: Channel, plot_hint: Option<String>) -> Self {
        let mut ctx = Self::blank(Trigger::Interactive { channel }, text.into());
        ctx.plot_hint = plot_hint.filter(|p| !p.trim().is_empty());
        ctx
    }

    /// A timer firing for one plot. Language and intent arrive preset.
    pub fn scheduled(kind: ScheduleKind, plot_id: impl Into<String>, channel: Channel) -> Self {
        let plot_id = plot_id.into();
        let mut ctx = Self::blank(Trigger::Scheduled { kind, channel }, String::new());
        ctx.detected_language.value = Some(Language::Secondary);
        ctx.intent.value = Some(IntentResolution {
            intent: kind.intent(),
            params: IntentParams::for_plot(plot_id.clone()),
            source: IntentSource::Preset,
        });
        ctx.plot_hint = Some(plot_id);
        ctx
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.trigger, Trigger::Scheduled { .. })
    }

    pub fn agent_opinions(&self) -> &[AgentOpinion] {
        &self.agent_opinions
    }

    pub fn append_opinions(&mut self, opinions: impl IntoIterator<Item = AgentOpinion>) {
        self.agent_opinions.extend(opinions);
    }

    pub fn stages_run(&self) -> &[PipelineStage] {
        &self.stages_run
    }

    /// Records entry into a stage; a stage may run at most once
    pub(crate) fn enter(&mut self, stage: PipelineStage) -> AppResult<()> {
        if self.stages_run.contains(&stage) {
            return Err(AppError::malformed(format!("stage {} entered twice", stage)));
        }
        self.stages_run.push(stage);
        Ok(())
    }

    /// Language for outbound text
    pub fn reply_language(&self) -> Language {
        self.detected_language
            .get()
            .copied()
            .unwrap_or(Language::Unknown)
            .outbound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;

    #[test]
    fn test_write_once_rejects_second_write() {
        let mut cell = WriteOnce::new("intent");
        assert!(cell.set(1).is_ok());
        let err = cell.set(2).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(cell.get(), Some(&1));
    }

    #[test]
    fn test_require_before_write_is_malformed() {
        let cell: WriteOnce<u8> = WriteOnce::new("plot");
        assert!(matches!(cell.require(), Err(AppError::MalformedInput(_))));
    }

    #[test]
    fn test_scheduled_context_is_preset() {
        let ctx = RequestContext::scheduled(ScheduleKind::SatelliteCheck, "athota", Channel::Telegram);
        assert!(ctx.is_scheduled());
        assert_eq!(ctx.detected_language.get(), Some(&Language::Secondary));
        let intent = ctx.intent.get().unwrap();
        assert_eq!(intent.intent, Intent::HealthCheck);
        assert_eq!(intent.params.plot.as_deref(), Some("athota"));
        assert_eq!(ctx.trigger.mode(), DecisionMode::Scheduled);
    }

    #[test]
    fn test_interactive_context_starts_empty() {
        let ctx = RequestContext::interactive("status", Channel::Ui, Some("  ".into()));
        assert!(!ctx.detected_language.is_set());
        assert!(ctx.plot_hint.is_none());
        assert_eq!(ctx.reply_language(), Language::Primary);
    }

    #[test]
    fn test_stage_cannot_run_twice() {
        let mut ctx = RequestContext::interactive("status", Channel::Ui, None);
        assert!(ctx.enter(PipelineStage::DetectLanguage).is_ok());
        assert!(ctx.enter(PipelineStage::DetectLanguage).is_err());
    }
}
