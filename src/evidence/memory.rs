use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    EvidencePayload, EvidenceRecord, EvidenceSet, EvidenceStore, IrrigationHistory, Plot,
    SatelliteReading, WeatherForecast,
};
use crate::types::AppResult;

/// Evidence store kept in process memory. Used for tests and when no
/// database is configured.
#[derive(Default)]
pub struct InMemoryEvidenceStore {
    plots: RwLock<Vec<Plot>>,
    evidence: RwLock<HashMap<String, EvidenceSet>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_plot(&self, plot: Plot) {
        let mut plots = self.plots.write().await;
        plots.retain(|p| p.id != plot.id);
        plots.push(plot);
    }

    pub async fn set_evidence(&self, plot_id: &str, evidence: EvidenceSet) {
        self.evidence.write().await.insert(plot_id.to_string(), evidence);
    }

    /// The three family plots, with readings recent enough to produce advice.
    pub async fn demo() -> Self {
        let store = Self::new();
        let plots = [
            ("thurpu", "Thurpu Polam", "తూర్పు పొలం", "thurpu", "Jowar", 7, 0.62, Some(0.64)),
            ("athota", "Athota Road Polam", "అత్తోట రోడ్ పొలం", "athota", "Paddy", 4, 0.48, Some(0.61)),
            ("munnagi", "Munnagi Road Polam", "మున్నంగి రోడ్ పొలం", "munnagi", "Maize", 5, 0.71, None),
        ];
        for (id, en, te, alias, crop, freq, ndvi, prev) in plots {
            store
                .insert_plot(Plot {
                    id: id.to_string(),
                    name_english: en.to_string(),
                    name_telugu: te.to_string(),
                    aliases: vec![alias.to_string()],
                    crop_type: crop.to_string(),
                    irrigation_frequency_days: freq,
                })
                .await;
            let evidence = EvidenceSet::new()
                .with(EvidenceRecord::new(
                    20.0,
                    0.9,
                    EvidencePayload::Satellite(SatelliteReading {
                        ndvi,
                        cloud_cover_pct: Some(12.0),
                        previous_ndvi: prev,
                        captured_by: Some("Sentinel-2A".to_string()),
                    }),
                ))
                .with(EvidenceRecord::new(
                    3.0,
                    0.95,
                    EvidencePayload::Weather(WeatherForecast {
                        forecast_precip_prob: vec![0.1, 0.2, 0.05],
                        forecast_temp_max_c: Some(33.0),
                    }),
                ))
                .with(EvidenceRecord::new(
                    0.0,
                    1.0,
                    EvidencePayload::History(IrrigationHistory {
                        days_since_irrigation: Some(3),
                        ndvi_history: prev.into_iter().collect(),
                    }),
                ));
            store.set_evidence(id, evidence).await;
        }
        store
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn list_plots(&self) -> AppResult<Vec<Plot>> {
        Ok(self.plots.read().await.clone())
    }

    async fn get_plot(&self, plot_id: &str) -> AppResult<Option<Plot>> {
        Ok(self
            .plots
            .read()
            .await
            .iter()
            .find(|p| p.id == plot_id)
            .cloned())
    }

    async fn get_plot_evidence(&self, plot_id: &str, _as_of: DateTime<Utc>) -> AppResult<EvidenceSet> {
        Ok(self
            .evidence
            .read()
            .await
            .get(plot_id)
            .cloned()
            .unwrap_or_default())
    }
}
