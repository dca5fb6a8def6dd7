//! Evidence model and the evidence-store collaborator
//!
//! Evidence is produced elsewhere (satellite pipeline, weather client,
//! irrigation log). The core only reads freshness and reliability to judge
//! completeness; each agent reads the payload of the sources it owns.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryEvidenceStore;
pub use postgres::PgEvidenceStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Satellite,
    Weather,
    History,
}

impl EvidenceSource {
    /// Gaps in required sources always escalate
    pub fn is_required(self) -> bool {
        matches!(self, EvidenceSource::Satellite | EvidenceSource::Weather)
    }
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceSource::Satellite => write!(f, "satellite"),
            EvidenceSource::Weather => write!(f, "weather"),
            EvidenceSource::History => write!(f, "history"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteReading {
    pub ndvi: f64,
    #[serde(default)]
    pub cloud_cover_pct: Option<f64>,
    /// NDVI of the previous recorded reading, if any
    #[serde(default)]
    pub previous_ndvi: Option<f64>,
    #[serde(default)]
    pub captured_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    /// Daily precipitation probability, index 0 = today
    pub forecast_precip_prob: Vec<f64>,
    #[serde(default)]
    pub forecast_temp_max_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationHistory {
    pub days_since_irrigation: Option<u32>,
    /// Most recent first
    #[serde(default)]
    pub ndvi_history: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidencePayload {
    Satellite(SatelliteReading),
    Weather(WeatherForecast),
    History(IrrigationHistory),
}

impl EvidencePayload {
    pub fn source(&self) -> EvidenceSource {
        match self {
            EvidencePayload::Satellite(_) => EvidenceSource::Satellite,
            EvidencePayload::Weather(_) => EvidenceSource::Weather,
            EvidencePayload::History(_) => EvidenceSource::History,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub freshness_hours: f64,
    pub source_reliability: f64,
    pub payload: EvidencePayload,
}

impl EvidenceRecord {
    pub fn new(freshness_hours: f64, source_reliability: f64, payload: EvidencePayload) -> Self {
        Self {
            freshness_hours,
            source_reliability,
            payload,
        }
    }

    pub fn source(&self) -> EvidenceSource {
        self.payload.source()
    }

    /// Linear decay from full weight at age 0 to nothing at `max_age_hours`
    pub fn freshness_factor(&self, max_age_hours: f64) -> f64 {
        (1.0 - self.freshness_hours / max_age_hours).clamp(0.0, 1.0)
    }

    /// Rejects values no adapter should ever produce.
    pub fn validate(&self) -> AppResult<()> {
        let source = self.source();
        if !self.freshness_hours.is_finite() || self.freshness_hours < 0.0 {
            return Err(AppError::malformed(format!(
                "{} evidence has invalid freshness {}",
                source, self.freshness_hours
            )));
        }
        if !(0.0..=1.0).contains(&self.source_reliability) {
            return Err(AppError::malformed(format!(
                "{} evidence has reliability {} outside [0, 1]",
                source, self.source_reliability
            )));
        }
        match &self.payload {
            EvidencePayload::Satellite(s) => {
                if !s.ndvi.is_finite() || !(-1.0..=1.0).contains(&s.ndvi) {
                    return Err(AppError::malformed(format!("NDVI {} outside [-1, 1]", s.ndvi)));
                }
            }
            EvidencePayload::Weather(w) => {
                if let Some(p) = w.forecast_precip_prob.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                    return Err(AppError::malformed(format!(
                        "precipitation probability {} outside [0, 1]",
                        p
                    )));
                }
            }
            EvidencePayload::History(_) => {}
        }
        Ok(())
    }
}

/// Evidence gathered for one plot, keyed by source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSet {
    records: BTreeMap<EvidenceSource, EvidenceRecord>,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, record: EvidenceRecord) -> Self {
        self.insert(record);
        self
    }

    pub fn insert(&mut self, record: EvidenceRecord) {
        self.records.insert(record.source(), record);
    }

    pub fn get(&self, source: EvidenceSource) -> Option<&EvidenceRecord> {
        self.records.get(&source)
    }

    pub fn contains(&self, source: EvidenceSource) -> bool {
        self.records.contains_key(&source)
    }

    pub fn sources(&self) -> impl Iterator<Item = EvidenceSource> + '_ {
        self.records.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn satellite(&self) -> Option<(&EvidenceRecord, &SatelliteReading)> {
        self.get(EvidenceSource::Satellite).and_then(|r| match &r.payload {
            EvidencePayload::Satellite(s) => Some((r, s)),
            _ => None,
        })
    }

    pub fn weather(&self) -> Option<(&EvidenceRecord, &WeatherForecast)> {
        self.get(EvidenceSource::Weather).and_then(|r| match &r.payload {
            EvidencePayload::Weather(w) => Some((r, w)),
            _ => None,
        })
    }

    pub fn history(&self) -> Option<(&EvidenceRecord, &IrrigationHistory)> {
        self.get(EvidenceSource::History).and_then(|r| match &r.payload {
            EvidencePayload::History(h) => Some((r, h)),
            _ => None,
        })
    }

    /// Restricts the set to the sources an agent is allowed to read
    pub fn subset(&self, sources: &[EvidenceSource]) -> EvidenceSet {
        EvidenceSet {
            records: self
                .records
                .iter()
                .filter(|(k, _)| sources.contains(k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        self.records.values().try_for_each(EvidenceRecord::validate)
    }
}

/// A farm plot known to the evidence store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub id: String,
    pub name_english: String,
    pub name_telugu: String,
    /// Extra spellings farmers use ("thurpu", "తూర్పు")
    #[serde(default)]
    pub aliases: Vec<String>,
    pub crop_type: String,
    pub irrigation_frequency_days: u32,
}

impl Plot {
    /// All lowercase names this plot answers to
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![
            self.id.to_lowercase(),
            self.name_english.to_lowercase(),
            self.name_telugu.clone(),
        ];
        names.extend(self.aliases.iter().map(|a| a.to_lowercase()));
        names.retain(|n| !n.trim().is_empty());
        names
    }
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn list_plots(&self) -> AppResult<Vec<Plot>>;

    async fn get_plot(&self, plot_id: &str) -> AppResult<Option<Plot>>;

    /// Partial records are returned as a set with the source absent, not as errors.
    async fn get_plot_evidence(&self, plot_id: &str, as_of: DateTime<Utc>) -> AppResult<EvidenceSet>;
}
