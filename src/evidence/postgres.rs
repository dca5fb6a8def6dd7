use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::warn;

use super::{
    EvidencePayload, EvidenceRecord, EvidenceSet, EvidenceSource, EvidenceStore, IrrigationHistory,
    Plot, SatelliteReading, WeatherForecast,
};
use crate::config::DatabaseConfig;
use crate::types::{AppError, AppResult};

/// Reliability assigned to irrigation-log evidence; it is entered by hand.
const HISTORY_RELIABILITY: f64 = 1.0;
const HISTORY_WINDOW_DAYS: i32 = 30;

#[derive(Debug, sqlx::FromRow)]
struct PlotRow {
    id: String,
    name_english: String,
    name_telugu: String,
    aliases: Vec<String>,
    crop_type: String,
    irrigation_frequency_days: i32,
}

impl From<PlotRow> for Plot {
    fn from(row: PlotRow) -> Self {
        Plot {
            id: row.id,
            name_english: row.name_english,
            name_telugu: row.name_telugu,
            aliases: row.aliases,
            crop_type: row.crop_type,
            irrigation_frequency_days: row.irrigation_frequency_days.max(1) as u32,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SatelliteRow {
    captured_at: DateTime<Utc>,
    ndvi: f64,
    cloud_cover: Option<f64>,
    source: String,
    reliability: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct WeatherRow {
    fetched_at: DateTime<Utc>,
    precip_prob: Vec<f64>,
    temp_max_c: Option<f64>,
    reliability: f64,
}

pub struct PgEvidenceStore {
    pool: PgPool,
}

fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - earlier).num_minutes().max(0) as f64) / 60.0
}

impl PgEvidenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig, url: &str) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(url)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn satellite_evidence(&self, plot_id: &str, as_of: DateTime<Utc>) -> AppResult<Option<EvidenceRecord>> {
        let rows = sqlx::query_as::<_, SatelliteRow>(
            r#"
            SELECT captured_at, ndvi, cloud_cover, source, reliability
            FROM satellite_history
            WHERE plot_id = $1 AND captured_at <= $2
            ORDER BY captured_at DESC
            LIMIT 2
            "#,
        )
        .bind(plot_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        let mut rows = rows.into_iter();
        let Some(latest) = rows.next() else {
            return Ok(None);
        };
        let previous_ndvi = rows.next().map(|r| r.ndvi);

        Ok(Some(EvidenceRecord::new(
            hours_between(latest.captured_at, as_of),
            latest.reliability.clamp(0.0, 1.0),
            EvidencePayload::Satellite(SatelliteReading {
                ndvi: latest.ndvi,
                cloud_cover_pct: latest.cloud_cover,
                previous_ndvi,
                captured_by: Some(latest.source),
            }),
        )))
    }

    async fn weather_evidence(&self, plot_id: &str, as_of: DateTime<Utc>) -> AppResult<Option<EvidenceRecord>> {
        let row = sqlx::query_as::<_, WeatherRow>(
            r#"
            SELECT fetched_at, precip_prob, temp_max_c, reliability
            FROM weather_readings
            WHERE plot_id = $1 AND fetched_at <= $2
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(plot_id)
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            EvidenceRecord::new(
                hours_between(row.fetched_at, as_of),
                row.reliability.clamp(0.0, 1.0),
                EvidencePayload::Weather(WeatherForecast {
                    forecast_precip_prob: row.precip_prob,
                    forecast_temp_max_c: row.temp_max_c,
                }),
            )
        }))
    }

    async fn history_evidence(&self, plot_id: &str, as_of: DateTime<Utc>) -> AppResult<Option<EvidenceRecord>> {
        let last_irrigated: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(irrigated_at) FROM irrigation_log WHERE plot_id = $1 AND irrigated_at <= $2",
        )
        .bind(plot_id)
        .bind(as_of)
        .fetch_one(&self.pool)
        .await?;

        let samples: Vec<(f64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT ndvi, captured_at FROM satellite_history
            WHERE plot_id = $1
              AND captured_at <= $2
              AND captured_at > $2 - make_interval(days => $3)
            ORDER BY captured_at DESC
            "#,
        )
        .bind(plot_id)
        .bind(as_of)
        .bind(HISTORY_WINDOW_DAYS)
        .fetch_all(&self.pool)
        .await?;

        if last_irrigated.is_none() && samples.is_empty() {
            return Ok(None);
        }

        let newest_sample = samples.first().map(|(_, captured_at)| *captured_at);
        let freshness = history_age_hours(last_irrigated, newest_sample, as_of);
        let ndvi_history = samples.into_iter().map(|(ndvi, _)| ndvi).collect();
        Ok(Some(EvidenceRecord::new(
            freshness,
            HISTORY_RELIABILITY,
            EvidencePayload::History(IrrigationHistory {
                days_since_irrigation: last_irrigated.map(|t| (as_of - t).num_days().max(0) as u32),
                ndvi_history,
            }),
        )))
    }
}

/// Age of the history record: the last irrigation, else the newest NDVI
/// sample, else the whole history window.
fn history_age_hours(
    last_irrigated: Option<DateTime<Utc>>,
    newest_sample: Option<DateTime<Utc>>,
    as_of: DateTime<Utc>,
) -> f64 {
    last_irrigated
        .or(newest_sample)
        .map(|t| hours_between(t, as_of))
        .unwrap_or(f64::from(HISTORY_WINDOW_DAYS) * 24.0)
}

/// Collapses a per-source failure into an absent source.
fn partial(source: EvidenceSource, plot_id: &str, result: AppResult<Option<EvidenceRecord>>) -> Option<EvidenceRecord> {
    match result {
        Ok(record) => record,
        Err(e) => {
            warn!(plot_id = %plot_id, source = %source, error = %e, "Evidence query failed, treating source as missing");
            None
        }
    }
}

#[async_trait]
impl EvidenceStore for PgEvidenceStore {
    async fn list_plots(&self) -> AppResult<Vec<Plot>> {
        let rows = sqlx::query_as::<_, PlotRow>(
            r#"
            SELECT id, name_english, name_telugu, aliases, crop_type, irrigation_frequency_days
            FROM plots
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Plot::from).collect())
    }

    async fn get_plot(&self, plot_id: &str) -> AppResult<Option<Plot>> {
        let row = sqlx::query_as::<_, PlotRow>(
            r#"
            SELECT id, name_english, name_telugu, aliases, crop_type, irrigation_frequency_days
            FROM plots
            WHERE id = $1
            "#,
        )
        .bind(plot_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Plot::from))
    }

    async fn get_plot_evidence(&self, plot_id: &str, as_of: DateTime<Utc>) -> AppResult<EvidenceSet> {
        let satellite = self.satellite_evidence(plot_id, as_of).await;
        let weather = self.weather_evidence(plot_id, as_of).await;
        let history = self.history_evidence(plot_id, as_of).await;

        // Every source down usually means the database is down
        if let (Err(AppError::Database(e)), Err(_), Err(_)) = (&satellite, &weather, &history) {
            return Err(AppError::evidence_unavailable(EvidenceSource::Satellite, e.to_string()));
        }

        let mut set = EvidenceSet::new();
        for (source, result) in [
            (EvidenceSource::Satellite, satellite),
            (EvidenceSource::Weather, weather),
            (EvidenceSource::History, history),
        ] {
            if let Some(record) = partial(source, plot_id, result) {
                set.insert(record);
            }
        }
        Ok(set)
    }
}
