//! Uncertainty Handler
//!
//! Decides whether a draft is good enough to send. Interactive requests with
//! weak or incomplete evidence get a clarifying question back; scheduled runs
//! have nobody to answer, so they get the advisory flagged as low confidence.
//! The NDVI-drop alert is decided independently of confidence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::agents::NdviDrop;
use crate::config::AdvisoryConfig;
use crate::coordinator::AdvisoryDraft;
use crate::evidence::{EvidenceSource, Plot};
use crate::messages::{self, BilingualText};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    Interactive,
    Scheduled,
}

/// What a clarifying question is about
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionFocus {
    MissingSource { source: EvidenceSource },
    StaleSource { source: EvidenceSource, hours: f64 },
    LowConfidence { confidence: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Advisory {
        draft: AdvisoryDraft,
        alert: Option<NdviDrop>,
        low_confidence: bool,
    },
    ClarifyingQuestion {
        text: BilingualText,
        missing_evidence: BTreeSet<EvidenceSource>,
        focus: QuestionFocus,
    },
}

impl Outcome {
    pub fn is_advisory(&self) -> bool {
        matches!(self, Outcome::Advisory { .. })
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, Outcome::Advisory { alert: Some(_), .. })
    }
}

pub struct UncertaintyHandler {
    escalation_threshold: f64,
    ndvi_drop_alert_delta: f64,
    alert_max_age_hours: f64,
}

impl UncertaintyHandler {
    pub fn new(config: &AdvisoryConfig) -> Self {
        Self {
            escalation_threshold: config.escalation_threshold,
            ndvi_drop_alert_delta: config.ndvi_drop_alert_delta,
            alert_max_age_hours: config.alert_max_age_hours,
        }
    }

    pub fn should_escalate(&self, draft: &AdvisoryDraft) -> bool {
        draft.aggregate_confidence < self.escalation_threshold
            || draft.missing_evidence.iter().any(|s| s.is_required())
    }

    /// A fresh image whose NDVI fell by more than the alert delta
    pub fn alert(&self, draft: &AdvisoryDraft) -> Option<NdviDrop> {
        let fresh = draft
            .satellite_age_hours
            .map(|age| age <= self.alert_max_age_hours)
            .unwrap_or(false);
        draft
            .ndvi_drop
            .filter(|drop| fresh && drop.delta() > self.ndvi_drop_alert_delta)
    }

    pub fn decide(&self, draft: AdvisoryDraft, mode: DecisionMode, plot: &Plot) -> Outcome {
        let alert = self.alert(&draft);
        let escalate = self.should_escalate(&draft);

        if escalate && mode == DecisionMode::Interactive {
            let focus = Self::focus(&draft);
            info!(
                plot_id = %plot.id,
                confidence = draft.aggregate_confidence,
                focus = ?focus,
                "Escalating to clarifying question"
            );
            let text = match focus {
                QuestionFocus::MissingSource { source } => messages::missing_source_question(plot, source),
                QuestionFocus::StaleSource { source, hours } => {
                    messages::stale_source_question(plot, source, hours)
                }
                QuestionFocus::LowConfidence { confidence } => {
                    messages::low_confidence_question(plot, confidence)
                }
            };
            return Outcome::ClarifyingQuestion {
                text,
                missing_evidence: draft.missing_evidence,
                focus,
            };
        }

        if escalate {
            info!(
                plot_id = %plot.id,
                confidence = draft.aggregate_confidence,
                "Scheduled advisory flagged as low confidence"
            );
        }
        Outcome::Advisory {
            draft,
            alert,
            low_confidence: escalate,
        }
    }

    fn focus(draft: &AdvisoryDraft) -> QuestionFocus {
        if let Some(source) = draft.missing_evidence.iter().copied().find(|s| s.is_required()) {
            return QuestionFocus::MissingSource { source };
        }
        if let Some((source, hours)) = draft.stale_evidence().into_iter().next() {
            return QuestionFocus::StaleSource { source, hours };
        }
        QuestionFocus::LowConfidence {
            confidence: draft.aggregate_confidence,
        }
    }
}
