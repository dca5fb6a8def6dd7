//! Weather Analyst
//!
//! Looks at the rain forecast over the plot's irrigation window and decides
//! whether watering can wait for rain.

use super::{AgentContext, AgentKind, AgentOpinion, Caveat, Finding, Stance};
use crate::evidence::{EvidenceSet, EvidenceSource};
use crate::types::AppResult;

pub struct WeatherAnalystAgent;

impl WeatherAnalystAgent {
    pub fn evaluate(evidence: &EvidenceSet, ctx: &AgentContext<'_>) -> AppResult<AgentOpinion> {
        let Some((record, forecast)) = evidence.weather() else {
            return Ok(AgentOpinion::missing(AgentKind::WeatherAnalyst, &[EvidenceSource::Weather]));
        };

        let window = ctx.irrigation_window_days.max(1) as usize;
        let days: Vec<f64> = forecast.forecast_precip_prob.iter().take(window).copied().collect();
        if days.is_empty() {
            return Ok(AgentOpinion::missing(AgentKind::WeatherAnalyst, &[EvidenceSource::Weather])
                .with_caveat(Caveat::note("Forecast contains no days")));
        }

        let freshness = record.freshness_factor(ctx.config.weather_max_age_hours);
        let coverage = days.len() as f64 / window as f64;
        let confidence = record.source_reliability * freshness * coverage;

        let likely = ctx.config.rain_likely_probability;
        let rain_day = days.iter().position(|p| *p >= likely).map(|d| d as u32);
        let max_precip_prob = days.iter().copied().fold(0.0_f64, f64::max);

        let (claim, stance) = match rain_day {
            Some(0) => (
                format!("Rain likely today ({:.0}%), skip irrigation", days[0] * 100.0),
                Stance::NoAction,
            ),
            Some(d) => (
                format!(
                    "Rain likely in {} day(s) ({:.0}%), irrigation can wait",
                    d,
                    days[d as usize] * 100.0
                ),
                Stance::Defer(d),
            ),
            None => match forecast.forecast_temp_max_c {
                Some(t) if t >= ctx.config.heat_stress_celsius => (
                    format!(
                        "No rain expected in the next {} day(s) and highs of {:.0}°C, irrigate now",
                        days.len(),
                        t
                    ),
                    Stance::ActNow,
                ),
                _ => (
                    format!(
                        "No significant rain expected in the next {} day(s), keep the regular schedule",
                        days.len()
                    ),
                    Stance::NoAction,
                ),
            },
        };

        let mut opinion = AgentOpinion::new(AgentKind::WeatherAnalyst, claim, stance, confidence)
            .supported_by(EvidenceSource::Weather)
            .with_finding(Finding::Weather {
                rain_day,
                max_precip_prob,
            });

        if freshness < 0.5 {
            opinion = opinion.with_caveat(Caveat::StaleEvidence {
                source: EvidenceSource::Weather,
                hours: record.freshness_hours,
            });
        }
        if coverage < 1.0 {
            opinion = opinion.with_caveat(Caveat::note(format!(
                "Forecast covers only {} of {} days",
                days.len(),
                window
            )));
        }

        Ok(opinion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisoryConfig;
    use crate::evidence::{EvidencePayload, EvidenceRecord, WeatherForecast};

    fn evidence(probs: Vec<f64>, temp: Option<f64>, freshness: f64) -> EvidenceSet {
        EvidenceSet::new().with(EvidenceRecord::new(
            freshness,
            1.0,
            EvidencePayload::Weather(WeatherForecast {
                forecast_precip_prob: probs,
                forecast_temp_max_c: temp,
            }),
        ))
    }

    #[test]
    fn test_rain_today_means_no_action() {
        let config = AdvisoryConfig::default();
        let ctx = AgentContext::new(&config, None);
        let opinion = WeatherAnalystAgent::evaluate(&evidence(vec![0.8, 0.1, 0.1], None, 0.0), &ctx).unwrap();
        assert_eq!(opinion.stance, Stance::NoAction);
        assert!((opinion.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rain_later_defers() {
        let config = AdvisoryConfig::default();
        let ctx = AgentContext::new(&config, None);
        let opinion = WeatherAnalystAgent::evaluate(&evidence(vec![0.1, 0.2, 0.7], None, 0.0), &ctx).unwrap();
        assert_eq!(opinion.stance, Stance::Defer(2));
    }

    #[test]
    fn test_rain_outside_window_is_ignored() {
        let config = AdvisoryConfig::default();
        let ctx = AgentContext::new(&config, Some(2));
        let opinion = WeatherAnalystAgent::evaluate(&evidence(vec![0.1, 0.2, 0.9], None, 0.0), &ctx).unwrap();
        assert_eq!(opinion.stance, Stance::NoAction);
    }

    #[test]
    fn test_dry_and_hot_acts_now() {
        let config = AdvisoryConfig::default();
        let ctx = AgentContext::new(&config, None);
        let opinion =
            WeatherAnalystAgent::evaluate(&evidence(vec![0.1, 0.1, 0.1], Some(38.0), 0.0), &ctx).unwrap();
        assert_eq!(opinion.stance, Stance::ActNow);
    }

    #[test]
    fn test_short_forecast_reduces_confidence() {
        let config = AdvisoryConfig::default();
        let ctx = AgentContext::new(&config, Some(4));
        let opinion = WeatherAnalystAgent::evaluate(&evidence(vec![0.1, 0.1], None, 0.0), &ctx).unwrap();
        assert!((opinion.confidence - 0.5).abs() < 1e-9);
        assert_eq!(opinion.caveats.len(), 1);
    }

    #[test]
    fn test_empty_forecast_counts_as_missing() {
        let config = AdvisoryConfig::default();
        let ctx = AgentContext::new(&config, None);
        let opinion = WeatherAnalystAgent::evaluate(&evidence(vec![], None, 0.0), &ctx).unwrap();
        assert_eq!(opinion.confidence, 0.0);
        assert_eq!(opinion.missing_evidence().count(), 1);
    }
}
