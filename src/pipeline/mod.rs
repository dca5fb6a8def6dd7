//! Pipeline Orchestrator
//!
//! ```text
//! START → DETECT_LANGUAGE → UNDERSTAND_INTENT → EXECUTE_ACTION → TRANSLATE → RESPOND → END
//!                                                   │               │
//!                                                   └── failure ────┴──→ RESPOND (degraded)
//! ```
//!
//! Each stage takes the [`RequestContext`] by value and hands it back. A
//! failing stage returns the context together with its error so the
//! orchestrator can still reach RESPOND with a fallback message. Only
//! `MalformedInput` aborts the run.
//!
//! Scheduled contexts arrive with language and intent already set and
//! start at EXECUTE_ACTION.

pub mod context;
pub mod format;
pub mod render;

pub use context::{MessageBody, RequestContext, Trigger, WriteOnce};

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::AdvisoryConfig;
use crate::coordinator::MultiAgentCoordinator;
use crate::evidence::{EvidenceSet, EvidenceStore, Plot};
use crate::intent::{Intent, IntentResolver};
use crate::language::{Language, LanguageClassifier};
use crate::messages::{self, BilingualText};
use crate::translation::{IdempotentTranslator, Translator};
use crate::types::{AppError, AppResult};
use crate::uncertainty::{Outcome, UncertaintyHandler};
use render::AdvisoryView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    DetectLanguage,
    UnderstandIntent,
    ExecuteAction,
    Translate,
    Respond,
}

impl PipelineStage {
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::DetectLanguage => Some(PipelineStage::UnderstandIntent),
            PipelineStage::UnderstandIntent => Some(PipelineStage::ExecuteAction),
            PipelineStage::ExecuteAction => Some(PipelineStage::Translate),
            PipelineStage::Translate => Some(PipelineStage::Respond),
            PipelineStage::Respond => None,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::DetectLanguage => "DETECT_LANGUAGE",
            PipelineStage::UnderstandIntent => "UNDERSTAND_INTENT",
            PipelineStage::ExecuteAction => "EXECUTE_ACTION",
            PipelineStage::Translate => "TRANSLATE",
            PipelineStage::Respond => "RESPOND",
        };
        f.write_str(name)
    }
}

/// A stage error that still carries the context
#[derive(Debug)]
pub struct StageFailure {
    pub ctx: Box<RequestContext>,
    pub error: AppError,
}

impl StageFailure {
    fn new(ctx: RequestContext, error: AppError) -> Self {
        Self {
            ctx: Box::new(ctx),
            error,
        }
    }
}

type StageResult = Result<RequestContext, StageFailure>;

/// Unwraps a result inside a stage, handing the context back on error
macro_rules! try_stage {
    ($ctx:ident, $expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(error) => return Err(StageFailure::new($ctx, error)),
        }
    };
}

pub struct Pipeline {
    classifier: LanguageClassifier,
    intents: IntentResolver,
    store: Arc<dyn EvidenceStore>,
    coordinator: MultiAgentCoordinator,
    uncertainty: UncertaintyHandler,
    translator: IdempotentTranslator,
}

impl Pipeline {
    pub fn new(
        config: &AdvisoryConfig,
        intents: IntentResolver,
        store: Arc<dyn EvidenceStore>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        let classifier = LanguageClassifier::new(config.min_classifiable_chars);
        Self {
            classifier,
            intents,
            store,
            coordinator: MultiAgentCoordinator::new(config.clone()),
            uncertainty: UncertaintyHandler::new(config),
            translator: IdempotentTranslator::new(translator, classifier),
        }
    }

    pub fn store(&self) -> &Arc<dyn EvidenceStore> {
        &self.store
    }

    /// Drives a context from its first stage to RESPOND
    pub async fn run(&self, ctx: RequestContext) -> AppResult<RequestContext> {
        let mut ctx = ctx;
        let mut stage = if ctx.is_scheduled() {
            PipelineStage::ExecuteAction
        } else {
            PipelineStage::DetectLanguage
        };
        info!(request_id = %ctx.request_id, trigger = ?ctx.trigger, "Pipeline run started");

        loop {
            ctx.enter(stage)?;
            debug!(request_id = %ctx.request_id, stage = %stage, "Entering stage");

            let result = match stage {
                PipelineStage::DetectLanguage => self.detect_language(ctx),
                PipelineStage::UnderstandIntent => self.understand_intent(ctx).await,
                PipelineStage::ExecuteAction => self.execute_action(ctx).await,
                PipelineStage::Translate => self.translate(ctx).await,
                PipelineStage::Respond => self.respond(ctx),
            };

            let failed = match result {
                Ok(next) => {
                    ctx = next;
                    false
                }
                Err(failure) if failure.error.is_fatal() => {
                    error!(
                        request_id = %failure.ctx.request_id,
                        stage = %stage,
                        error = %failure.error,
                        "Pipeline aborted"
                    );
                    return Err(failure.error);
                }
                Err(failure) => {
                    ctx = *failure.ctx;
                    warn!(
                        request_id = %ctx.request_id,
                        stage = %stage,
                        error = %failure.error,
                        "Stage failed, responding with fallback message"
                    );
                    ctx.degraded = true;
                    ctx.notes.push(format!("{}: {}", stage, failure.error));
                    if !ctx.final_message.is_set() {
                        ctx.final_message.set(messages::degraded())?;
                    }
                    true
                }
            };

            stage = match (failed, stage) {
                (_, PipelineStage::Respond) => break,
                (true, _) => PipelineStage::Respond,
                (false, current) => match current.next() {
                    Some(next) => next,
                    None => break,
                },
            };
        }

        info!(
            request_id = %ctx.request_id,
            degraded = ctx.degraded,
            language = %ctx.reply_language(),
            "Pipeline run finished"
        );
        Ok(ctx)
    }

    fn detect_language(&self, mut ctx: RequestContext) -> StageResult {
        let language = self.classifier.classify(&ctx.raw_text);
        debug!(request_id = %ctx.request_id, language = %language, "Language detected");
        try_stage!(ctx, ctx.detected_language.set(language));
        Ok(ctx)
    }

    async fn understand_intent(&self, mut ctx: RequestContext) -> StageResult {
        let language = try_stage!(ctx, ctx.detected_language.require().copied());
        // Plot names help both tiers; without them we still classify
        let plots = match self.store.list_plots().await {
            Ok(plots) => plots,
            Err(e) => {
                warn!(request_id = %ctx.request_id, error = %e, "Could not load plots for intent resolution");
                Vec::new()
            }
        };
        let resolution = self.intents.resolve(&ctx.raw_text, language, &plots).await;
        info!(
            request_id = %ctx.request_id,
            intent = %resolution.intent,
            source = ?resolution.source,
            plot = ?resolution.params.plot,
            "Intent resolved"
        );
        try_stage!(ctx, ctx.intent.set(resolution));
        Ok(ctx)
    }

    async fn execute_action(&self, mut ctx: RequestContext) -> StageResult {
        let resolution = try_stage!(ctx, ctx.intent.require().cloned());

        if resolution.intent == Intent::Unknown {
            try_stage!(ctx, ctx.content.set(MessageBody::Catalog(messages::didnt_understand())));
            return Ok(ctx);
        }

        let plots = try_stage!(ctx, self.store.list_plots().await);
        let wanted = resolution.params.plot.clone().or_else(|| ctx.plot_hint.clone());
        let plot = match Self::pick_plot(wanted.as_deref(), &plots) {
            Ok(plot) => plot.clone(),
            Err(body) => {
                try_stage!(ctx, ctx.content.set(MessageBody::Catalog(body)));
                return Ok(ctx);
            }
        };

        let evidence = match self.store.get_plot_evidence(&plot.id, ctx.received_at).await {
            Ok(evidence) => evidence,
            Err(e) if e.is_fatal() => return Err(StageFailure::new(ctx, e)),
            Err(e) => {
                // Treated as every source missing; the uncertainty handler asks about it
                warn!(request_id = %ctx.request_id, plot_id = %plot.id, error = %e, "Evidence unavailable");
                ctx.notes.push(e.to_string());
                EvidenceSet::new()
            }
        };

        let draft = try_stage!(
            ctx,
            self.coordinator.coordinate(&evidence, resolution.params.days)
        );
        info!(
            request_id = %ctx.request_id,
            plot_id = %plot.id,
            recommendation = %draft.recommendation,
            confidence = draft.aggregate_confidence,
            missing = ?draft.missing_evidence,
            "Advisory drafted"
        );

        ctx.append_opinions(draft.contributing_opinions.iter().cloned());
        try_stage!(ctx, ctx.aggregate.set(draft.clone()));

        let outcome = self.uncertainty.decide(draft, ctx.trigger.mode(), &plot);
        let body = match &outcome {
            Outcome::Advisory {
                draft,
                alert,
                low_confidence,
            } => MessageBody::Compose(render::advisory_text(&AdvisoryView {
                intent: resolution.intent,
                plot: &plot,
                draft,
                alert: *alert,
                low_confidence: *low_confidence,
                history: evidence.history().map(|(_, h)| h),
            })),
            Outcome::ClarifyingQuestion { text, .. } => MessageBody::Catalog(text.clone()),
        };

        try_stage!(ctx, ctx.plot.set(plot));
        try_stage!(ctx, ctx.evidence.set(evidence));
        try_stage!(ctx, ctx.outcome.set(outcome));
        try_stage!(ctx, ctx.content.set(body));
        Ok(ctx)
    }

    /// The requested plot, the only plot, or a question asking which one
    fn pick_plot<'a>(wanted: Option<&str>, plots: &'a [Plot]) -> Result<&'a Plot, BilingualText> {
        if plots.is_empty() {
            return Err(messages::no_plots());
        }
        match wanted {
            Some(id) => plots
                .iter()
                .find(|p| p.id.eq_ignore_ascii_case(id))
                .ok_or_else(|| {
                    let unknown = messages::unknown_plot(id);
                    let which = messages::which_plot(plots);
                    BilingualText::new(
                        format!("{} {}", unknown.primary, which.primary),
                        format!("{} {}", unknown.secondary, which.secondary),
                    )
                }),
            None if plots.len() == 1 => Ok(&plots[0]),
            None => Err(messages::which_plot(plots)),
        }
    }

    async fn translate(&self, mut ctx: RequestContext) -> StageResult {
        let body = try_stage!(ctx, ctx.content.require().cloned());
        let message = match body {
            MessageBody::Catalog(text) => text,
            MessageBody::Compose(english) => {
                match self.translator.translate(&english, Language::Secondary).await {
                    Ok(telugu) => BilingualText::new(english, telugu),
                    Err(e) => {
                        warn!(request_id = %ctx.request_id, error = %e, "Translation unavailable, sending English in both slots");
                        let telugu = format!("{}\n{}", messages::translation_unavailable_note(), english);
                        BilingualText::new(english, telugu)
                    }
                }
            }
        };
        try_stage!(ctx, ctx.final_message.set(message));
        Ok(ctx)
    }

    fn respond(&self, mut ctx: RequestContext) -> StageResult {
        let language = ctx.reply_language();
        let channel = ctx.trigger.channel();
        let message = try_stage!(ctx, ctx.final_message.require().cloned());
        let formatted = format::format_message(&message, language, channel);
        try_stage!(ctx, ctx.formatted.set(formatted));
        Ok(ctx)
    }
}

/// Shared entry point that lets only one run proceed at a time
#[derive(Clone)]
pub struct PipelineHandle {
    pipeline: Arc<Pipeline>,
    lock: Arc<Mutex<()>>,
}

impl PipelineHandle {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run(&self, ctx: RequestContext) -> AppResult<RequestContext> {
        let _guard = self.lock.lock().await;
        self.pipeline.run(ctx).await
    }

    pub fn store(&self) -> &Arc<dyn EvidenceStore> {
        self.pipeline.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::{healthy_evidence, satellite, weather};
    use crate::coordinator::Recommendation;
    use crate::delivery::Channel;
    use crate::evidence::InMemoryEvidenceStore;
    use crate::intent::{IntentClassifier, IntentParams};
    use crate::scheduler::ScheduleKind;
    use async_trait::async_trait;
    use std::time::Duration;

    struct DownClassifier;

    #[async_trait]
    impl IntentClassifier for DownClassifier {
        async fn classify(&self, _: &str, _: Language, _: &[Plot]) -> AppResult<(Intent, IntentParams)> {
            Err(AppError::ClassifierUnavailable("ollama not running".into()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl EvidenceStore for BrokenStore {
        async fn list_plots(&self) -> AppResult<Vec<Plot>> {
            Err(AppError::Internal("pool timed out".into()))
        }
        async fn get_plot(&self, _: &str) -> AppResult<Option<Plot>> {
            Ok(None)
        }
        async fn get_plot_evidence(&self, _: &str, _: chrono::DateTime<chrono::Utc>) -> AppResult<EvidenceSet> {
            Ok(EvidenceSet::new())
        }
    }

    struct ToTelugu;

    #[async_trait]
    impl Translator for ToTelugu {
        async fn translate(&self, _text: &str, _target: Language) -> AppResult<String> {
            Ok("తెలుగు అనువాదం".to_string())
        }
    }

    fn thurpu() -> Plot {
        Plot {
            id: "thurpu".into(),
            name_english: "Thurpu Polam".into(),
            name_telugu: "తూర్పు పొలం".into(),
            aliases: vec!["thurpu".into(), "తూర్పు".into()],
            crop_type: "Jowar".into(),
            irrigation_frequency_days: 7,
        }
    }

    fn athota() -> Plot {
        Plot {
            id: "athota".into(),
            name_english: "Athota Road Polam".into(),
            name_telugu: "అత్తోట రోడ్ పొలం".into(),
            aliases: vec!["athota".into()],
            crop_type: "Paddy".into(),
            irrigation_frequency_days: 4,
        }
    }

    async fn store_with(plot_evidence: Vec<(Plot, EvidenceSet)>) -> Arc<dyn EvidenceStore> {
        let store = InMemoryEvidenceStore::new();
        for (plot, evidence) in plot_evidence {
            let id = plot.id.clone();
            store.insert_plot(plot).await;
            store.set_evidence(&id, evidence).await;
        }
        Arc::new(store)
    }

    fn pipeline(store: Arc<dyn EvidenceStore>, translator: Option<Arc<dyn Translator>>) -> Pipeline {
        let intents = IntentResolver::new(Some(Arc::new(DownClassifier)), Duration::from_millis(200));
        Pipeline::new(&AdvisoryConfig::default(), intents, store, translator)
    }

    #[tokio::test]
    async fn test_healthy_plot_gets_no_action_advisory() {
        let store = store_with(vec![(thurpu(), healthy_evidence()), (athota(), EvidenceSet::new())]).await;
        let ctx = RequestContext::interactive("Is thurpu healthy?", Channel::Ui, None);
        let ctx = pipeline(store, Some(Arc::new(ToTelugu))).run(ctx).await.unwrap();

        assert_eq!(ctx.detected_language.get(), Some(&Language::Primary));
        assert_eq!(ctx.intent.get().unwrap().intent, Intent::HealthCheck);
        match ctx.outcome.get().unwrap() {
            Outcome::Advisory { draft, low_confidence, .. } => {
                assert_eq!(draft.recommendation, Recommendation::NoAction);
                assert!(draft.aggregate_confidence >= 0.7);
                assert!(!low_confidence);
            }
            other => panic!("expected advisory, got {:?}", other),
        }
        assert_eq!(ctx.agent_opinions().len(), 4);
        let formatted = ctx.formatted.get().unwrap();
        assert!(formatted.starts_with("🌾 Thurpu Polam"));
        assert!(formatted.contains(format::SEPARATOR));
        assert!(formatted.ends_with("తెలుగు అనువాదం"));
        assert_eq!(
            ctx.stages_run(),
            &[
                PipelineStage::DetectLanguage,
                PipelineStage::UnderstandIntent,
                PipelineStage::ExecuteAction,
                PipelineStage::Translate,
                PipelineStage::Respond,
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_satellite_asks_clarifying_question() {
        let evidence = EvidenceSet::new().with(weather(vec![0.1, 0.05, 0.0], None, 1.0, 0.95));
        let store = store_with(vec![(thurpu(), evidence)]).await;
        let ctx = RequestContext::interactive("should I water thurpu", Channel::Ui, None);
        let ctx = pipeline(store, None).run(ctx).await.unwrap();

        match ctx.outcome.get().unwrap() {
            Outcome::ClarifyingQuestion { missing_evidence, .. } => {
                assert!(missing_evidence.contains(&crate::evidence::EvidenceSource::Satellite));
            }
            other => panic!("expected question, got {:?}", other),
        }
        let satellite_opinion = &ctx.agent_opinions()[0];
        assert_eq!(satellite_opinion.confidence, 0.0);
        assert!(ctx.formatted.get().unwrap().contains("satellite imagery"));
    }

    #[tokio::test]
    async fn test_unknown_intent_with_llm_down_says_didnt_understand() {
        let store = store_with(vec![(thurpu(), healthy_evidence())]).await;
        let ctx = RequestContext::interactive("కబుర్లు ఏమిటి", Channel::Ui, None);
        let ctx = pipeline(store, None).run(ctx).await.unwrap();

        assert_eq!(ctx.detected_language.get(), Some(&Language::Secondary));
        assert_eq!(ctx.intent.get().unwrap().intent, Intent::Unknown);
        assert!(ctx.stages_run().contains(&PipelineStage::Respond));
        assert!(ctx.formatted.get().unwrap().starts_with("క్షమించండి, మీ సందేశం నాకు అర్థం కాలేదు"));
        assert!(!ctx.degraded);
    }

    #[tokio::test]
    async fn test_no_plot_named_asks_which_plot() {
        let store = store_with(vec![(thurpu(), healthy_evidence()), (athota(), healthy_evidence())]).await;
        let ctx = RequestContext::interactive("should I water today?", Channel::Ui, None);
        let ctx = pipeline(store, None).run(ctx).await.unwrap();
        let formatted = ctx.formatted.get().unwrap();
        assert!(formatted.starts_with("Which plot do you mean?"));
        assert!(formatted.contains("Athota Road Polam"));
        assert!(ctx.outcome.get().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_degrades_but_responds() {
        let ctx = RequestContext::interactive("ఆరోగ్యం ఎలా ఉంది", Channel::Telegram, None);
        let ctx = pipeline(Arc::new(BrokenStore), None).run(ctx).await.unwrap();
        assert!(ctx.degraded);
        assert!(ctx.formatted.get().unwrap().starts_with("క్షమించండి, ప్రస్తుతం"));
        assert!(!ctx.stages_run().contains(&PipelineStage::Translate));
    }

    #[tokio::test]
    async fn test_scheduled_satellite_check_raises_alert() {
        let evidence = EvidenceSet::new()
            .with(satellite(0.48, Some(0.61), 6.0, 0.9))
            .with(weather(vec![0.1, 0.2, 0.05], None, 3.0, 0.95));
        let store = store_with(vec![(athota(), evidence)]).await;
        let ctx = RequestContext::scheduled(ScheduleKind::SatelliteCheck, "athota", Channel::Telegram);
        let ctx = pipeline(store, None).run(ctx).await.unwrap();

        assert!(ctx.outcome.get().unwrap().is_alert());
        assert_eq!(
            ctx.stages_run(),
            &[PipelineStage::ExecuteAction, PipelineStage::Translate, PipelineStage::Respond]
        );
        // Scheduled messages lead with Telugu; English follows the separator
        let formatted = ctx.formatted.get().unwrap();
        assert!(formatted.contains("ALERT: NDVI fell from 0.61 to 0.48"));
    }

    #[tokio::test]
    async fn test_interactive_low_confidence_is_never_advisory() {
        let evidence = EvidenceSet::new()
            .with(satellite(0.7, None, 150.0, 0.3))
            .with(weather(vec![0.1, 0.1, 0.1], None, 40.0, 0.3));
        let store = store_with(vec![(thurpu(), evidence)]).await;
        let ctx = RequestContext::interactive("thurpu status", Channel::Ui, None);
        let ctx = pipeline(store, None).run(ctx).await.unwrap();
        let draft = ctx.aggregate.get().unwrap();
        assert!(draft.aggregate_confidence < 0.5);
        assert!(!ctx.outcome.get().unwrap().is_advisory());
    }

    #[tokio::test]
    async fn test_handle_serialises_runs() {
        let store = store_with(vec![(thurpu(), healthy_evidence())]).await;
        let handle = PipelineHandle::new(pipeline(store, None));
        let (a, b) = tokio::join!(
            handle.run(RequestContext::interactive("thurpu status", Channel::Ui, None)),
            handle.run(RequestContext::interactive("thurpu water", Channel::Ui, None)),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_ne!(a.unwrap().request_id, b.unwrap().request_id);
    }
}
