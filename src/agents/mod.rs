//! Agent System
//!
//! Four specialised agents each turn a slice of the evidence into a typed
//! opinion with a confidence score:
//!
//! - **Satellite Interpreter**: crop health from NDVI imagery
//! - **Weather Analyst**: irrigation timing from the rain forecast
//! - **Crop-Health Diagnostic**: reconciles the first two into one action
//! - **Farmer Communication**: picks the tone for the farmer-facing message
//!
//! ## Invocation Order
//!
//! ```text
//!  satellite evidence      weather evidence
//!        │                        │
//!        ▼                        ▼
//! ┌─────────────┐         ┌─────────────┐
//! │  Satellite  │         │   Weather   │
//! │ Interpreter │         │   Analyst   │
//! └─────────────┘         └─────────────┘
//!        │                        │
//!        └──────────┬─────────────┘
//!                   ▼
//!          ┌─────────────────┐
//!          │   Crop-Health   │  ← also reads both evidence records
//!          │   Diagnostic    │
//!          └─────────────────┘
//!                   │
//!                   ▼
//!          ┌─────────────────┐
//!          │     Farmer      │  ← opinions only, no raw evidence
//!          │  Communication  │
//!          └─────────────────┘
//! ```
//!
//! Later agents read earlier opinions, so the order is fixed by
//! [`INVOCATION_ORDER`] rather than registered dynamically.

pub mod communication;
pub mod diagnostic;
pub mod satellite;
pub mod weather;

pub use communication::{FarmerCommunicationAgent, Tone};
pub use diagnostic::CropHealthDiagnosticAgent;
pub use satellite::{HealthClass, SatelliteInterpreterAgent};
pub use weather::WeatherAnalystAgent;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::AdvisoryConfig;
use crate::coordinator::Recommendation;
use crate::evidence::{EvidenceSet, EvidenceSource};
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    SatelliteInterpreter,
    WeatherAnalyst,
    CropHealthDiagnostic,
    FarmerCommunication,
}

/// Dependency order. Each agent may read the opinions of those before it.
pub const INVOCATION_ORDER: [AgentKind; 4] = [
    AgentKind::SatelliteInterpreter,
    AgentKind::WeatherAnalyst,
    AgentKind::CropHealthDiagnostic,
    AgentKind::FarmerCommunication,
];

impl AgentKind {
    pub fn name(self) -> &'static str {
        match self {
            AgentKind::SatelliteInterpreter => "Satellite Interpreter",
            AgentKind::WeatherAnalyst => "Weather Analyst",
            AgentKind::CropHealthDiagnostic => "Crop-Health Diagnostic",
            AgentKind::FarmerCommunication => "Farmer Communication",
        }
    }

    /// Evidence sources this agent is handed directly
    pub fn evidence_sources(self) -> &'static [EvidenceSource] {
        match self {
            AgentKind::SatelliteInterpreter => &[EvidenceSource::Satellite],
            AgentKind::WeatherAnalyst => &[EvidenceSource::Weather],
            AgentKind::CropHealthDiagnostic => &[EvidenceSource::Satellite, EvidenceSource::Weather],
            AgentKind::FarmerCommunication => &[],
        }
    }

    /// Position in [`INVOCATION_ORDER`]
    pub fn position(self) -> usize {
        INVOCATION_ORDER.iter().position(|k| *k == self).unwrap_or(0)
    }

    /// Runs the agent. `evidence` must already be restricted to
    /// [`AgentKind::evidence_sources`] and `prior` must hold exactly the
    /// opinions of the agents that precede this one.
    pub fn evaluate(
        self,
        evidence: &EvidenceSet,
        prior: &[AgentOpinion],
        ctx: &AgentContext<'_>,
    ) -> AppResult<AgentOpinion> {
        if let Some(extra) = evidence.sources().find(|s| !self.evidence_sources().contains(s)) {
            return Err(AppError::malformed(format!(
                "{} was handed {} evidence it does not own",
                self.name(),
                extra
            )));
        }
        evidence.validate()?;
        check_prior(self, prior)?;

        match self {
            AgentKind::SatelliteInterpreter => SatelliteInterpreterAgent::evaluate(evidence, ctx),
            AgentKind::WeatherAnalyst => WeatherAnalystAgent::evaluate(evidence, ctx),
            AgentKind::CropHealthDiagnostic => CropHealthDiagnosticAgent::evaluate(evidence, prior, ctx),
            AgentKind::FarmerCommunication => FarmerCommunicationAgent::evaluate(prior),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn check_prior(agent: AgentKind, prior: &[AgentOpinion]) -> AppResult<()> {
    let expected = &INVOCATION_ORDER[..agent.position()];
    let actual: Vec<AgentKind> = prior.iter().map(|o| o.agent).collect();
    if actual != expected {
        return Err(AppError::malformed(format!(
            "{} expected prior opinions {:?}, got {:?}",
            agent, expected, actual
        )));
    }
    Ok(())
}

/// Settings shared by all agents for one evaluation pass
#[derive(Debug, Clone, Copy)]
pub struct AgentContext<'a> {
    pub config: &'a AdvisoryConfig,
    /// Days ahead the Weather Analyst looks, normally the plot's irrigation cycle
    pub irrigation_window_days: u32,
}

impl<'a> AgentContext<'a> {
    pub fn new(config: &'a AdvisoryConfig, irrigation_window_days: Option<u32>) -> Self {
        Self {
            config,
            irrigation_window_days: irrigation_window_days
                .filter(|d| *d > 0)
                .unwrap_or(config.default_irrigation_window_days),
        }
    }
}

/// Urgency of an opinion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stance", content = "days", rename_all = "snake_case")]
pub enum Stance {
    ActNow,
    Defer(u32),
    NoAction,
    Undetermined,
}

impl Stance {
    /// Act-now against no-action, in either direction
    pub fn conflicts_with(self, other: Stance) -> bool {
        matches!(
            (self, other),
            (Stance::ActNow, Stance::NoAction) | (Stance::NoAction, Stance::ActNow)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Caveat {
    MissingEvidence { source: EvidenceSource },
    StaleEvidence { source: EvidenceSource, hours: f64 },
    Disagreement { detail: String },
    Note { text: String },
}

impl Caveat {
    pub fn note(text: impl Into<String>) -> Self {
        Caveat::Note { text: text.into() }
    }

    pub fn missing_source(&self) -> Option<EvidenceSource> {
        match self {
            Caveat::MissingEvidence { source } => Some(*source),
            _ => None,
        }
    }
}

impl std::fmt::Display for Caveat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Caveat::MissingEvidence { source } => write!(f, "missing {} evidence", source),
            Caveat::StaleEvidence { source, hours } => {
                write!(f, "{} evidence is {:.0} hours old", source, hours)
            }
            Caveat::Disagreement { detail } => write!(f, "disagreement: {}", detail),
            Caveat::Note { text } => f.write_str(text),
        }
    }
}

/// An NDVI fall between two consecutive readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NdviDrop {
    pub previous: f64,
    pub current: f64,
}

impl NdviDrop {
    pub fn delta(&self) -> f64 {
        self.previous - self.current
    }
}

/// Agent-specific structured result alongside the free-text claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Satellite {
        health: HealthClass,
        ndvi: f64,
        ndvi_drop: Option<NdviDrop>,
    },
    Weather {
        rain_day: Option<u32>,
        max_precip_prob: f64,
    },
    Diagnostic {
        recommendation: Recommendation,
        disagreement: bool,
    },
    Communication {
        tone: Tone,
    },
    None,
}

/// Immutable once built; the coordinator only ever appends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOpinion {
    pub agent: AgentKind,
    pub claim: String,
    pub stance: Stance,
    pub confidence: f64,
    pub supporting_evidence: BTreeSet<EvidenceSource>,
    pub caveats: Vec<Caveat>,
    pub finding: Finding,
}

impl AgentOpinion {
    pub fn new(agent: AgentKind, claim: impl Into<String>, stance: Stance, confidence: f64) -> Self {
        Self {
            agent,
            claim: claim.into(),
            stance,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            supporting_evidence: BTreeSet::new(),
            caveats: Vec::new(),
            finding: Finding::None,
        }
    }

    /// Zero-confidence opinion for an agent whose evidence is absent
    pub fn missing(agent: AgentKind, missing: &[EvidenceSource]) -> Self {
        let names: Vec<String> = missing.iter().map(|s| s.to_string()).collect();
        let mut opinion = Self::new(
            agent,
            format!("No {} data available", names.join(" or ")),
            Stance::Undetermined,
            0.0,
        );
        opinion.caveats = missing
            .iter()
            .map(|source| Caveat::MissingEvidence { source: *source })
            .collect();
        opinion
    }

    pub fn supported_by(mut self, source: EvidenceSource) -> Self {
        self.supporting_evidence.insert(source);
        self
    }

    pub fn with_caveat(mut self, caveat: Caveat) -> Self {
        self.caveats.push(caveat);
        self
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.finding = finding;
        self
    }

    pub fn missing_evidence(&self) -> impl Iterator<Item = EvidenceSource> + '_ {
        self.caveats.iter().filter_map(Caveat::missing_source)
    }

    pub fn is_determined(&self) -> bool {
        self.stance != Stance::Undetermined && self.confidence > 0.0
    }
}
