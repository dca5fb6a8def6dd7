//! Multi-Agent Coordinator
//!
//! Runs the four agents in their fixed order over one plot's evidence and
//! folds the opinions into an [`AdvisoryDraft`]. Single synchronous pass, no
//! I/O: everything the agents need is already in the evidence set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::agents::{
    AgentContext, AgentKind, AgentOpinion, Finding, HealthClass, NdviDrop, Stance, Tone,
    INVOCATION_ORDER,
};
use crate::config::{AdvisoryConfig, AggregationWeights};
use crate::evidence::{EvidenceSet, EvidenceSource};
use crate::types::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "days", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    IrrigateNow,
    IrrigateInDays(u32),
    NoAction,
    InspectPlot,
}

impl Recommendation {
    pub fn stance(self) -> Stance {
        match self {
            Recommendation::IrrigateNow | Recommendation::InspectPlot => Stance::ActNow,
            Recommendation::IrrigateInDays(days) => Stance::Defer(days),
            Recommendation::NoAction => Stance::NoAction,
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::IrrigateNow => write!(f, "IRRIGATE_NOW"),
            Recommendation::IrrigateInDays(days) => write!(f, "IRRIGATE_IN_{}_DAYS", days),
            Recommendation::NoAction => write!(f, "NO_ACTION"),
            Recommendation::InspectPlot => write!(f, "INSPECT_PLOT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryDraft {
    pub recommendation: Recommendation,
    pub aggregate_confidence: f64,
    /// In invocation order
    pub contributing_opinions: Vec<AgentOpinion>,
    pub missing_evidence: BTreeSet<EvidenceSource>,
    pub ndvi_drop: Option<NdviDrop>,
    /// Age of the satellite image behind `ndvi_drop`
    pub satellite_age_hours: Option<f64>,
}

impl AdvisoryDraft {
    pub fn opinion(&self, kind: AgentKind) -> Option<&AgentOpinion> {
        self.contributing_opinions.iter().find(|o| o.agent == kind)
    }

    pub fn health(&self) -> Option<(HealthClass, f64)> {
        self.opinion(AgentKind::SatelliteInterpreter)
            .and_then(|o| match o.finding {
                Finding::Satellite { health, ndvi, .. } => Some((health, ndvi)),
                _ => None,
            })
    }

    pub fn tone(&self) -> Tone {
        self.opinion(AgentKind::FarmerCommunication)
            .and_then(|o| match o.finding {
                Finding::Communication { tone } => Some(tone),
                _ => None,
            })
            .unwrap_or(Tone::Cautious)
    }

    pub fn disagreement(&self) -> bool {
        self.opinion(AgentKind::CropHealthDiagnostic)
            .map(|o| matches!(o.finding, Finding::Diagnostic { disagreement: true, .. }))
            .unwrap_or(false)
    }

    /// Sources any agent flagged as stale, with their age
    pub fn stale_evidence(&self) -> Vec<(EvidenceSource, f64)> {
        let mut stale: Vec<(EvidenceSource, f64)> = Vec::new();
        for caveat in self.contributing_opinions.iter().flat_map(|o| o.caveats.iter()) {
            if let crate::agents::Caveat::StaleEvidence { source, hours } = caveat {
                if !stale.iter().any(|(s, _)| s == source) {
                    stale.push((*source, *hours));
                }
            }
        }
        stale
    }
}

fn weight_of(weights: &AggregationWeights, kind: AgentKind) -> f64 {
    match kind {
        AgentKind::SatelliteInterpreter => weights.satellite,
        AgentKind::WeatherAnalyst => weights.weather,
        AgentKind::CropHealthDiagnostic => weights.diagnostic,
        AgentKind::FarmerCommunication => weights.communication,
    }
}

/// Weighted mean of opinion confidences, always within [0, 1]
pub fn aggregate_confidence(weights: &AggregationWeights, opinions: &[AgentOpinion]) -> f64 {
    let (weighted, total) = opinions.iter().fold((0.0, 0.0), |(sum, total), o| {
        let w = weight_of(weights, o.agent);
        (sum + w * o.confidence, total + w)
    });
    if total <= 0.0 {
        return 0.0;
    }
    (weighted / total).clamp(0.0, 1.0)
}

pub struct MultiAgentCoordinator {
    config: AdvisoryConfig,
}

impl MultiAgentCoordinator {
    pub fn new(config: AdvisoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvisoryConfig {
        &self.config
    }

    pub fn coordinate(&self, evidence: &EvidenceSet, window_days: Option<u32>) -> AppResult<AdvisoryDraft> {
        let ctx = AgentContext::new(&self.config, window_days);
        let mut opinions: Vec<AgentOpinion> = Vec::with_capacity(INVOCATION_ORDER.len());

        for kind in INVOCATION_ORDER {
            let slice = evidence.subset(kind.evidence_sources());
            let opinion = kind.evaluate(&slice, &opinions, &ctx)?;
            debug!(
                agent = %kind,
                confidence = opinion.confidence,
                stance = ?opinion.stance,
                "Agent opinion"
            );
            opinions.push(opinion);
        }

        let aggregate = aggregate_confidence(&self.config.weights, &opinions);

        let diagnostic = &opinions[AgentKind::CropHealthDiagnostic.position()];
        let recommendation = match diagnostic.finding {
            Finding::Diagnostic { recommendation, .. } if diagnostic.confidence >= self.config.diagnostic_floor => {
                recommendation
            }
            _ => Recommendation::InspectPlot,
        };

        let missing_evidence: BTreeSet<EvidenceSource> =
            opinions.iter().flat_map(|o| o.missing_evidence()).collect();

        let ndvi_drop = opinions.iter().find_map(|o| match o.finding {
            Finding::Satellite { ndvi_drop, .. } => ndvi_drop,
            _ => None,
        });
        let satellite_age_hours = evidence.satellite().map(|(record, _)| record.freshness_hours);

        Ok(AdvisoryDraft {
            recommendation,
            aggregate_confidence: aggregate,
            contributing_opinions: opinions,
            missing_evidence,
            ndvi_drop,
            satellite_age_hours,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::evidence::{EvidencePayload, EvidenceRecord, SatelliteReading, WeatherForecast};

    pub(crate) fn satellite(ndvi: f64, previous: Option<f64>, freshness: f64, reliability: f64) -> EvidenceRecord {
        EvidenceRecord::new(
            freshness,
            reliability,
            EvidencePayload::Satellite(SatelliteReading {
                ndvi,
                cloud_cover_pct: None,
                previous_ndvi: previous,
                captured_by: None,
            }),
        )
    }

    pub(crate) fn weather(probs: Vec<f64>, temp: Option<f64>, freshness: f64, reliability: f64) -> EvidenceRecord {
        EvidenceRecord::new(
            freshness,
            reliability,
            EvidencePayload::Weather(WeatherForecast {
                forecast_precip_prob: probs,
                forecast_temp_max_c: temp,
            }),
        )
    }

    pub(crate) fn healthy_evidence() -> EvidenceSet {
        EvidenceSet::new()
            .with(satellite(0.65, None, 2.0, 0.9))
            .with(weather(vec![0.1, 0.05, 0.0], None, 1.0, 0.95))
    }

    #[test]
    fn test_healthy_scenario_is_confident_no_action() {
        let coordinator = MultiAgentCoordinator::new(AdvisoryConfig::default());
        let draft = coordinator.coordinate(&healthy_evidence(), None).unwrap();
        assert_eq!(draft.recommendation, Recommendation::NoAction);
        assert!(draft.aggregate_confidence >= 0.7, "{}", draft.aggregate_confidence);
        assert!(draft.missing_evidence.is_empty());
        assert_eq!(draft.contributing_opinions.len(), 4);
        assert_eq!(draft.tone(), Tone::Reassuring);
    }

    #[test]
    fn test_missing_satellite_is_reported() {
        let coordinator = MultiAgentCoordinator::new(AdvisoryConfig::default());
        let evidence = EvidenceSet::new().with(weather(vec![0.1, 0.05, 0.0], None, 1.0, 0.95));
        let draft = coordinator.coordinate(&evidence, None).unwrap();
        assert_eq!(draft.opinion(AgentKind::SatelliteInterpreter).unwrap().confidence, 0.0);
        assert!(draft.missing_evidence.contains(&EvidenceSource::Satellite));
        assert_eq!(draft.recommendation, Recommendation::InspectPlot);
    }

    #[test]
    fn test_disagreement_is_capped() {
        let coordinator = MultiAgentCoordinator::new(AdvisoryConfig::default());
        let evidence = EvidenceSet::new()
            .with(satellite(0.3, None, 0.0, 1.0))
            .with(weather(vec![0.9, 0.1, 0.1], None, 0.0, 1.0));
        let draft = coordinator.coordinate(&evidence, None).unwrap();
        let diagnostic = draft.opinion(AgentKind::CropHealthDiagnostic).unwrap();
        assert!(diagnostic.confidence <= 0.5);
        assert!(draft.disagreement());
        assert_eq!(draft.recommendation, Recommendation::InspectPlot);
    }

    #[test]
    fn test_disagreement_with_stale_weather_is_still_capped() {
        let coordinator = MultiAgentCoordinator::new(AdvisoryConfig::default());
        // Forecast is exactly at its max age, so the weather opinion carries no weight
        let evidence = EvidenceSet::new()
            .with(satellite(0.3, None, 2.0, 0.9))
            .with(weather(vec![0.1, 0.1, 0.1], None, 48.0, 0.95));
        let draft = coordinator.coordinate(&evidence, None).unwrap();
        let weather_opinion = draft.opinion(AgentKind::WeatherAnalyst).unwrap();
        assert_eq!(weather_opinion.confidence, 0.0);
        let diagnostic = draft.opinion(AgentKind::CropHealthDiagnostic).unwrap();
        assert!(diagnostic.confidence <= 0.5, "{}", diagnostic.confidence);
        assert!(draft.disagreement());
        assert_eq!(draft.recommendation, Recommendation::InspectPlot);
        assert!(draft.aggregate_confidence < 0.5, "{}", draft.aggregate_confidence);
    }

    #[test]
    fn test_disagreement_with_unreliable_weather_is_still_capped() {
        let coordinator = MultiAgentCoordinator::new(AdvisoryConfig::default());
        let evidence = EvidenceSet::new()
            .with(satellite(0.3, None, 0.0, 1.0))
            .with(weather(vec![0.1, 0.1, 0.1], None, 0.0, 0.0));
        let draft = coordinator.coordinate(&evidence, None).unwrap();
        let diagnostic = draft.opinion(AgentKind::CropHealthDiagnostic).unwrap();
        assert!(diagnostic.confidence <= 0.5);
        assert_ne!(draft.recommendation, Recommendation::IrrigateNow);
    }

    #[test]
    fn test_aggregate_is_bounded_and_deterministic() {
        let coordinator = MultiAgentCoordinator::new(AdvisoryConfig::default());
        let cases = [
            EvidenceSet::new(),
            healthy_evidence(),
            EvidenceSet::new().with(satellite(0.1, Some(0.5), 300.0, 0.2)),
            EvidenceSet::new()
                .with(satellite(0.25, None, 10.0, 1.0))
                .with(weather(vec![0.0], Some(40.0), 60.0, 1.0)),
        ];
        for evidence in cases {
            let first = coordinator.coordinate(&evidence, None).unwrap();
            let second = coordinator.coordinate(&evidence, None).unwrap();
            assert!((0.0..=1.0).contains(&first.aggregate_confidence));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_diagnostic_floor_forces_inspection() {
        let config = AdvisoryConfig {
            diagnostic_floor: 0.95,
            ..AdvisoryConfig::default()
        };
        let draft = MultiAgentCoordinator::new(config)
            .coordinate(&healthy_evidence(), None)
            .unwrap();
        assert_eq!(draft.recommendation, Recommendation::InspectPlot);
    }

    #[test]
    fn test_ndvi_drop_is_carried() {
        let coordinator = MultiAgentCoordinator::new(AdvisoryConfig::default());
        let evidence = EvidenceSet::new()
            .with(satellite(0.48, Some(0.61), 6.0, 0.9))
            .with(weather(vec![0.1, 0.1, 0.1], None, 1.0, 0.95));
        let draft = coordinator.coordinate(&evidence, None).unwrap();
        let drop = draft.ndvi_drop.unwrap();
        assert!((drop.delta() - 0.13).abs() < 1e-9);
        assert_eq!(draft.satellite_age_hours, Some(6.0));
    }

    #[test]
    fn test_zero_weights_yield_zero() {
        let weights = AggregationWeights {
            satellite: 0.0,
            weather: 0.0,
            diagnostic: 0.0,
            communication: 0.0,
        };
        assert_eq!(aggregate_confidence(&weights, &[]), 0.0);
    }
}
