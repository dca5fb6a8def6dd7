//! Satellite Interpreter
//!
//! Reads the latest NDVI reading and classifies crop health. Confidence is
//! the source reliability scaled down linearly as the image ages.

use serde::{Deserialize, Serialize};

use super::{AgentContext, AgentKind, AgentOpinion, Caveat, Finding, NdviDrop, Stance};
use crate::evidence::{EvidenceSet, EvidenceSource};
use crate::types::AppResult;

/// Cloud cover above this makes NDVI unreliable
const CLOUD_COVER_WARN_PCT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthClass {
    Healthy,
    Moderate,
    Stressed,
    Severe,
}

impl HealthClass {
    pub fn from_ndvi(ndvi: f64) -> Self {
        if ndvi >= 0.6 {
            HealthClass::Healthy
        } else if ndvi >= 0.4 {
            HealthClass::Moderate
        } else if ndvi >= 0.2 {
            HealthClass::Stressed
        } else {
            HealthClass::Severe
        }
    }

    pub fn needs_water(self) -> bool {
        matches!(self, HealthClass::Stressed | HealthClass::Severe)
    }

    pub fn label(self) -> &'static str {
        match self {
            HealthClass::Healthy => "healthy",
            HealthClass::Moderate => "moderate",
            HealthClass::Stressed => "stressed",
            HealthClass::Severe => "severely stressed",
        }
    }
}

pub struct SatelliteInterpreterAgent;

impl SatelliteInterpreterAgent {
    pub fn evaluate(evidence: &EvidenceSet, ctx: &AgentContext<'_>) -> AppResult<AgentOpinion> {
        let Some((record, reading)) = evidence.satellite() else {
            return Ok(AgentOpinion::missing(
                AgentKind::SatelliteInterpreter,
                &[EvidenceSource::Satellite],
            ));
        };

        let health = HealthClass::from_ndvi(reading.ndvi);
        let freshness = record.freshness_factor(ctx.config.satellite_max_age_hours);
        let confidence = record.source_reliability * freshness;

        let stance = if health.needs_water() {
            Stance::ActNow
        } else {
            Stance::NoAction
        };

        let ndvi_drop = reading
            .previous_ndvi
            .filter(|previous| *previous > reading.ndvi)
            .map(|previous| NdviDrop {
                previous,
                current: reading.ndvi,
            });

        let mut opinion = AgentOpinion::new(
            AgentKind::SatelliteInterpreter,
            format!("Crop looks {} (NDVI {:.2})", health.label(), reading.ndvi),
            stance,
            confidence,
        )
        .supported_by(EvidenceSource::Satellite)
        .with_finding(Finding::Satellite {
            health,
            ndvi: reading.ndvi,
            ndvi_drop,
        });

        if freshness < 0.5 {
            opinion = opinion.with_caveat(Caveat::StaleEvidence {
                source: EvidenceSource::Satellite,
                hours: record.freshness_hours,
            });
        }
        if let Some(cloud) = reading.cloud_cover_pct.filter(|c| *c > CLOUD_COVER_WARN_PCT) {
            opinion = opinion.with_caveat(Caveat::note(format!(
                "Cloud cover {:.0}% may distort the NDVI reading",
                cloud
            )));
        }
        if let Some(drop) = ndvi_drop.filter(|d| d.delta() > ctx.config.ndvi_drop_alert_delta) {
            opinion = opinion.with_caveat(Caveat::note(format!(
                "NDVI fell from {:.2} to {:.2} since the previous image",
                drop.previous, drop.current
            )));
        }

        Ok(opinion)
    }
}
