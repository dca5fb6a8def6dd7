use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::types::LLMProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub advisory: AdvisoryConfig,
    pub scheduler: SchedulerConfig,
    pub delivery: DeliveryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `None` runs against the in-memory demo store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: Option<LLMProvider>,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: String,
    pub timeout_ms: u64,
}

impl LLMConfig {
    /// The provider to use, if one is configured and usable
    pub fn active_provider(&self) -> Option<LLMProvider> {
        match self.provider {
            Some(LLMProvider::Anthropic) if self.api_key.is_empty() => None,
            other => other,
        }
    }
}

/// Weights used by the coordinator to fold the four opinions into one score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AggregationWeights {
    pub satellite: f64,
    pub weather: f64,
    pub diagnostic: f64,
    pub communication: f64,
}

impl Default for AggregationWeights {
    fn default() -> Self {
        Self {
            satellite: 0.30,
            weather: 0.25,
            diagnostic: 0.35,
            communication: 0.10,
        }
    }
}

impl AggregationWeights {
    pub fn total(&self) -> f64 {
        self.satellite + self.weather + self.diagnostic + self.communication
    }
}

/// Tunable thresholds for the agents, the coordinator and the uncertainty handler.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryConfig {
    pub weights: AggregationWeights,
    /// Below this diagnostic confidence the recommendation becomes INSPECT_PLOT.
    pub diagnostic_floor: f64,
    /// Below this aggregate confidence the advisory is escalated.
    pub escalation_threshold: f64,
    pub satellite_max_age_hours: f64,
    pub weather_max_age_hours: f64,
    /// Freshness limit for the NDVI-drop alert path.
    pub alert_max_age_hours: f64,
    pub ndvi_drop_alert_delta: f64,
    pub rain_likely_probability: f64,
    pub heat_stress_celsius: f64,
    pub default_irrigation_window_days: u32,
    pub min_classifiable_chars: usize,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            weights: AggregationWeights::default(),
            diagnostic_floor: 0.4,
            escalation_threshold: 0.5,
            satellite_max_age_hours: 168.0,
            weather_max_age_hours: 48.0,
            alert_max_age_hours: 48.0,
            ndvi_drop_alert_delta: 0.1,
            rain_likely_probability: 0.6,
            heat_stress_celsius: 35.0,
            default_irrigation_window_days: 3,
            min_classifiable_chars: 1,
        }
    }
}

impl AdvisoryConfig {
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("WEIGHT_SATELLITE", w.satellite),
            ("WEIGHT_WEATHER", w.weather),
            ("WEIGHT_DIAGNOSTIC", w.diagnostic),
            ("WEIGHT_COMMUNICATION", w.communication),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, value);
            }
        }
        if w.total() <= 0.0 {
            bail!("aggregation weights must not all be zero");
        }
        for (name, value) in [
            ("DIAGNOSTIC_FLOOR", self.diagnostic_floor),
            ("ESCALATION_THRESHOLD", self.escalation_threshold),
            ("RAIN_LIKELY_PROBABILITY", self.rain_likely_probability),
            ("NDVI_DROP_ALERT_DELTA", self.ndvi_drop_alert_delta),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        for (name, value) in [
            ("SATELLITE_MAX_AGE_HOURS", self.satellite_max_age_hours),
            ("WEATHER_MAX_AGE_HOURS", self.weather_max_age_hours),
            ("ALERT_MAX_AGE_HOURS", self.alert_max_age_hours),
        ] {
            if value.is_nan() || value <= 0.0 {
                bail!("{} must be positive, got {}", name, value);
            }
        }
        if self.default_irrigation_window_days == 0 {
            bail!("DEFAULT_IRRIGATION_WINDOW_DAYS must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Offset of the farm's local time from UTC (IST = 330).
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base: String,
    pub telegram_chat_ids: Vec<String>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<String>,
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {} ({})", key, raw, e)),
        _ => Ok(default),
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn list_var(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = AdvisoryConfig::default();
        let advisory = AdvisoryConfig {
            weights: AggregationWeights {
                satellite: var_or("WEIGHT_SATELLITE", defaults.weights.satellite)?,
                weather: var_or("WEIGHT_WEATHER", defaults.weights.weather)?,
                diagnostic: var_or("WEIGHT_DIAGNOSTIC", defaults.weights.diagnostic)?,
                communication: var_or("WEIGHT_COMMUNICATION", defaults.weights.communication)?,
            },
            diagnostic_floor: var_or("DIAGNOSTIC_FLOOR", defaults.diagnostic_floor)?,
            escalation_threshold: var_or("ESCALATION_THRESHOLD", defaults.escalation_threshold)?,
            satellite_max_age_hours: var_or("SATELLITE_MAX_AGE_HOURS", defaults.satellite_max_age_hours)?,
            weather_max_age_hours: var_or("WEATHER_MAX_AGE_HOURS", defaults.weather_max_age_hours)?,
            alert_max_age_hours: var_or("ALERT_MAX_AGE_HOURS", defaults.alert_max_age_hours)?,
            ndvi_drop_alert_delta: var_or("NDVI_DROP_ALERT_DELTA", defaults.ndvi_drop_alert_delta)?,
            rain_likely_probability: var_or("RAIN_LIKELY_PROBABILITY", defaults.rain_likely_probability)?,
            heat_stress_celsius: var_or("HEAT_STRESS_CELSIUS", defaults.heat_stress_celsius)?,
            default_irrigation_window_days: var_or(
                "DEFAULT_IRRIGATION_WINDOW_DAYS",
                defaults.default_irrigation_window_days,
            )?,
            min_classifiable_chars: var_or("MIN_CLASSIFIABLE_CHARS", defaults.min_classifiable_chars)?,
        };
        advisory.validate()?;

        let provider = match optional_var("LLM_PROVIDER") {
            None => Some(LLMProvider::Ollama),
            Some(id) if id.eq_ignore_ascii_case("none") => None,
            Some(id) => match LLMProvider::from_id(&id) {
                Some(p) => Some(p),
                None => bail!("unsupported LLM_PROVIDER: {}", id),
            },
        };
        let default_model = match provider {
            Some(LLMProvider::Anthropic) => "claude-3-5-sonnet-20241022",
            _ => "llama3.2:latest",
        };

        Ok(Self {
            server: ServerConfig {
                port: var_or("PORT", 3000)?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: list_var("ALLOWED_ORIGINS", "http://localhost:3000,http://localhost:5173"),
            },
            database: DatabaseConfig {
                url: optional_var("DATABASE_URL"),
                max_connections: var_or("DB_MAX_CONNECTIONS", 10)?,
                min_connections: var_or("DB_MIN_CONNECTIONS", 1)?,
            },
            llm: LLMConfig {
                provider,
                model: env::var("LLM_MODEL").unwrap_or_else(|_| default_model.to_string()),
                base_url: optional_var("LLM_BASE_URL"),
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                timeout_ms: var_or("LLM_TIMEOUT_MS", 8000)?,
            },
            advisory,
            scheduler: SchedulerConfig {
                enabled: var_or("SCHEDULER_ENABLED", true)?,
                utc_offset_minutes: var_or("SCHEDULER_UTC_OFFSET_MINUTES", 330)?,
            },
            delivery: DeliveryConfig {
                telegram_bot_token: optional_var("TELEGRAM_BOT_TOKEN"),
                telegram_api_base: env::var("TELEGRAM_API_BASE")
                    .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
                telegram_chat_ids: list_var("TELEGRAM_CHAT_IDS", ""),
                max_attempts: var_or("DELIVERY_MAX_ATTEMPTS", 3)?,
                base_delay_ms: var_or("DELIVERY_BASE_DELAY_MS", 500)?,
            },
            logging: LoggingConfig {
                log_dir: optional_var("LOG_DIR"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_advisory_config_is_valid() {
        let config = AdvisoryConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = AdvisoryConfig::default();
        config.weights.weather = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_all_zero_weights() {
        let mut config = AdvisoryConfig::default();
        config.weights = AggregationWeights {
            satellite: 0.0,
            weather: 0.0,
            diagnostic: 0.0,
            communication: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut config = AdvisoryConfig::default();
        config.escalation_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_anthropic_without_key_is_inactive() {
        let llm = LLMConfig {
            provider: Some(LLMProvider::Anthropic),
            model: "m".into(),
            base_url: None,
            api_key: String::new(),
            timeout_ms: 1000,
        };
        assert_eq!(llm.active_provider(), None);
    }
}
