//! Crop-Health Diagnostic
//!
//! Reconciles the satellite and weather opinions into one recommended
//! action. When the two point in opposite directions the diagnostic refuses
//! to pick a side: it recommends a field inspection and caps its own
//! confidence.

use super::{AgentContext, AgentKind, AgentOpinion, Caveat, Finding, HealthClass, Stance};
use crate::coordinator::Recommendation;
use crate::evidence::{EvidenceSet, EvidenceSource};
use crate::types::{AppError, AppResult};

const SATELLITE_SHARE: f64 = 0.6;
const WEATHER_SHARE: f64 = 0.4;
/// Confidence ceiling when satellite and weather disagree
pub const DISAGREEMENT_CAP: f64 = 0.5;

pub struct CropHealthDiagnosticAgent;

impl CropHealthDiagnosticAgent {
    pub fn evaluate(
        evidence: &EvidenceSet,
        prior: &[AgentOpinion],
        _ctx: &AgentContext<'_>,
    ) -> AppResult<AgentOpinion> {
        let (satellite, weather) = match prior {
            [s, w] => (s, w),
            _ => {
                return Err(AppError::malformed(
                    "diagnostic needs exactly the satellite and weather opinions",
                ))
            }
        };

        let health = match &satellite.finding {
            Finding::Satellite { health, .. } => Some(*health),
            _ => None,
        };

        let base = SATELLITE_SHARE * satellite.confidence + WEATHER_SHARE * weather.confidence;
        // Stances alone decide a conflict; a stale source still counts
        let disagreement = satellite.stance.conflicts_with(weather.stance);

        let (recommendation, claim) = if disagreement {
            (
                Recommendation::InspectPlot,
                format!(
                    "Satellite and weather disagree ({} / {}), inspect the plot before acting",
                    satellite.claim, weather.claim
                ),
            )
        } else {
            Self::reconcile(satellite, weather, health)
        };

        let confidence = if disagreement {
            base.min(DISAGREEMENT_CAP)
        } else {
            base
        };

        let mut opinion = AgentOpinion::new(
            AgentKind::CropHealthDiagnostic,
            claim,
            recommendation.stance(),
            confidence,
        )
        .with_finding(Finding::Diagnostic {
            recommendation,
            disagreement,
        });

        for source in [EvidenceSource::Satellite, EvidenceSource::Weather] {
            if evidence.contains(source) {
                opinion = opinion.supported_by(source);
            } else {
                opinion = opinion.with_caveat(Caveat::MissingEvidence { source });
            }
        }
        if disagreement {
            opinion = opinion.with_caveat(Caveat::Disagreement {
                detail: "crop stress and rain forecast point in opposite directions".to_string(),
            });
        }

        Ok(opinion)
    }

    fn reconcile(
        satellite: &AgentOpinion,
        weather: &AgentOpinion,
        health: Option<HealthClass>,
    ) -> (Recommendation, String) {
        let severe = health == Some(HealthClass::Severe);
        match (satellite.stance, weather.stance) {
            (Stance::Undetermined, _) => (
                Recommendation::InspectPlot,
                "No usable satellite image, crop health cannot be judged remotely".to_string(),
            ),
            (Stance::ActNow, Stance::ActNow) => (
                Recommendation::IrrigateNow,
                "Crop is stressed and no rain is coming, irrigate today".to_string(),
            ),
            (Stance::ActNow, Stance::Defer(days)) if !severe => (
                Recommendation::IrrigateInDays(days),
                format!("Crop is stressed but rain is expected in {} day(s)", days),
            ),
            (Stance::ActNow, _) if severe => (
                Recommendation::IrrigateNow,
                "Crop is severely stressed, irrigate today regardless of the forecast".to_string(),
            ),
            (Stance::ActNow, Stance::Undetermined) => (
                Recommendation::InspectPlot,
                "Crop shows stress but there is no forecast to plan around".to_string(),
            ),
            (Stance::ActNow, _) => (
                Recommendation::IrrigateNow,
                "Crop is stressed, irrigate today".to_string(),
            ),
            _ => (
                Recommendation::NoAction,
                "Crop is in good condition, no irrigation needed now".to_string(),
            ),
        }
    }
}
