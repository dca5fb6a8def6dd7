//! Farmer Communication
//!
//! Never sees raw evidence. Picks the tone of the outgoing message from the
//! three upstream opinions and reports how complete and consistent they are.

use serde::{Deserialize, Serialize};

use super::{AgentKind, AgentOpinion, Caveat, Finding};
use crate::coordinator::Recommendation;
use crate::types::{AppError, AppResult};

/// Agreement factor applied when the diagnostic flagged a disagreement
const DISAGREEMENT_FACTOR: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Reassuring,
    Advisory,
    Urgent,
    Cautious,
}

impl Tone {
    pub fn strategy(self) -> &'static str {
        match self {
            Tone::Reassuring => "Reassure the farmer that the crop is fine",
            Tone::Advisory => "Give a clear plan with the day to act",
            Tone::Urgent => "Lead with the action, keep it short",
            Tone::Cautious => "Explain what is uncertain and suggest checking the field",
        }
    }
}

pub struct FarmerCommunicationAgent;

impl FarmerCommunicationAgent {
    pub fn evaluate(prior: &[AgentOpinion]) -> AppResult<AgentOpinion> {
        let [satellite, weather, diagnostic] = prior else {
            return Err(AppError::malformed(
                "communication needs the satellite, weather and diagnostic opinions",
            ));
        };

        let (recommendation, disagreement) = match diagnostic.finding {
            Finding::Diagnostic {
                recommendation,
                disagreement,
            } => (recommendation, disagreement),
            _ => return Err(AppError::malformed("diagnostic opinion carries no recommendation")),
        };

        let upstream = [satellite, weather, diagnostic];
        let determined = upstream.iter().filter(|o| o.is_determined()).count();
        let completeness = determined as f64 / upstream.len() as f64;
        let agreement = if disagreement { DISAGREEMENT_FACTOR } else { 1.0 };

        let tone = if disagreement || determined < upstream.len() {
            Tone::Cautious
        } else {
            match recommendation {
                Recommendation::IrrigateNow => Tone::Urgent,
                Recommendation::IrrigateInDays(_) | Recommendation::InspectPlot => Tone::Advisory,
                Recommendation::NoAction => Tone::Reassuring,
            }
        };

        let mut opinion = AgentOpinion::new(
            AgentKind::FarmerCommunication,
            tone.strategy(),
            diagnostic.stance,
            completeness * agreement,
        )
        .with_finding(Finding::Communication { tone });

        for gap in upstream.iter().filter(|o| !o.is_determined()) {
            opinion = opinion.with_caveat(Caveat::note(format!("{} had nothing to report", gap.agent)));
        }

        Ok(opinion)
    }
}
