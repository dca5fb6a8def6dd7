//! English advisory text, composed from a draft before translation

use std::fmt::Write;

use crate::agents::{AgentKind, NdviDrop, Tone};
use crate::coordinator::{AdvisoryDraft, Recommendation};
use crate::evidence::{IrrigationHistory, Plot};
use crate::intent::Intent;

/// NDVI change over the history window that counts as a trend
const TREND_DELTA: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    fn label(self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
        }
    }
}

/// Trend across an NDVI history ordered most recent first
pub fn ndvi_trend(history: &[f64]) -> Option<Trend> {
    let (latest, oldest) = (history.first()?, history.last()?);
    if history.len() < 2 {
        return None;
    }
    let change = latest - oldest;
    Some(if change > TREND_DELTA {
        Trend::Improving
    } else if change < -TREND_DELTA {
        Trend::Declining
    } else {
        Trend::Stable
    })
}

fn recommendation_line(recommendation: Recommendation, tone: Tone) -> String {
    let line = match recommendation {
        Recommendation::IrrigateNow => "Irrigate today.".to_string(),
        Recommendation::IrrigateInDays(days) => format!(
            "Hold irrigation; rain is expected. Irrigate in {} day(s) if it does not come.",
            days
        ),
        Recommendation::NoAction => "No irrigation needed right now.".to_string(),
        Recommendation::InspectPlot => "Please inspect the plot before deciding on irrigation.".to_string(),
    };
    match tone {
        Tone::Urgent => format!("URGENT: {}", line),
        _ => line,
    }
}

fn title(intent: Intent) -> &'static str {
    match intent {
        Intent::HealthCheck => "Crop health check",
        Intent::IrrigationAdvice => "Irrigation advice",
        Intent::WeeklySummary => "Weekly summary",
        Intent::Alert => "Alert check",
        Intent::Unknown => "Advisory",
    }
}

pub struct AdvisoryView<'a> {
    pub intent: Intent,
    pub plot: &'a Plot,
    pub draft: &'a AdvisoryDraft,
    pub alert: Option<NdviDrop>,
    pub low_confidence: bool,
    pub history: Option<&'a IrrigationHistory>,
}

pub fn advisory_text(view: &AdvisoryView<'_>) -> String {
    let draft = view.draft;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "🌾 {} ({}): {}",
        view.plot.name_english,
        view.plot.crop_type,
        title(view.intent)
    );

    if let Some(drop) = view.alert {
        let _ = writeln!(
            out,
            "⚠️ ALERT: NDVI fell from {:.2} to {:.2} since the previous image. Check the plot soon.",
            drop.previous, drop.current
        );
    } else if view.intent == Intent::Alert {
        let _ = writeln!(out, "No alerts for this plot.");
    }

    let _ = writeln!(out, "{}", recommendation_line(draft.recommendation, draft.tone()));

    if let Some((health, ndvi)) = draft.health() {
        let _ = writeln!(out, "Crop health: {} (NDVI {:.2})", health.label(), ndvi);
    }
    if let Some(weather) = draft.opinion(AgentKind::WeatherAnalyst).filter(|o| o.is_determined()) {
        let _ = writeln!(out, "Weather: {}", weather.claim);
    }

    if view.intent == Intent::WeeklySummary {
        match view.history.and_then(|h| ndvi_trend(&h.ndvi_history)) {
            Some(trend) => {
                let _ = writeln!(out, "Trend this period: {}", trend.label());
            }
            None => {
                let _ = writeln!(out, "Not enough images yet to show a trend.");
            }
        }
    }

    if let Some(days) = view.history.and_then(|h| h.days_since_irrigation) {
        let cycle = view.plot.irrigation_frequency_days;
        if days >= cycle {
            let _ = writeln!(
                out,
                "Last irrigated {} day(s) ago; the {}-day cycle is due.",
                days, cycle
            );
        } else {
            let _ = writeln!(
                out,
                "Last irrigated {} day(s) ago; next cycle due in {} day(s).",
                days,
                cycle - days
            );
        }
    }

    let _ = writeln!(out, "Confidence: {:.0}%", draft.aggregate_confidence * 100.0);

    if view.low_confidence {
        let missing: Vec<String> = draft.missing_evidence.iter().map(|s| s.to_string()).collect();
        if missing.is_empty() {
            let _ = writeln!(out, "Low confidence: please verify in the field before acting.");
        } else {
            let _ = writeln!(
                out,
                "Low confidence: no {} data. Please verify in the field before acting.",
                missing.join(" or ")
            );
        }
    }

    let notes: Vec<String> = draft
        .contributing_opinions
        .iter()
        .flat_map(|o| o.caveats.iter())
        .filter(|c| c.missing_source().is_none())
        .map(|c| c.to_string())
        .collect();
    if !notes.is_empty() {
        let _ = writeln!(out, "Notes: {}", notes.join("; "));
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisoryConfig;
    use crate::coordinator::tests::{healthy_evidence, satellite, weather};
    use crate::coordinator::MultiAgentCoordinator;
    use crate::evidence::EvidenceSet;

    fn plot() -> Plot {
        Plot {
            id: "thurpu".into(),
            name_english: "Thurpu Polam".into(),
            name_telugu: "తూర్పు పొలం".into(),
            aliases: vec![],
            crop_type: "Jowar".into(),
            irrigation_frequency_days: 7,
        }
    }

    fn draft(evidence: &EvidenceSet) -> AdvisoryDraft {
        MultiAgentCoordinator::new(AdvisoryConfig::default())
            .coordinate(evidence, None)
            .unwrap()
    }

    #[test]
    fn test_trend() {
        assert_eq!(ndvi_trend(&[0.7, 0.6]), Some(Trend::Improving));
        assert_eq!(ndvi_trend(&[0.5, 0.52, 0.6]), Some(Trend::Declining));
        assert_eq!(ndvi_trend(&[0.6, 0.58]), Some(Trend::Stable));
        assert_eq!(ndvi_trend(&[0.6]), None);
        assert_eq!(ndvi_trend(&[]), None);
    }

    #[test]
    fn test_healthy_advisory_text() {
        let plot = plot();
        let draft = draft(&healthy_evidence());
        let text = advisory_text(&AdvisoryView {
            intent: Intent::HealthCheck,
            plot: &plot,
            draft: &draft,
            alert: None,
            low_confidence: false,
            history: None,
        });
        assert!(text.starts_with("🌾 Thurpu Polam (Jowar): Crop health check"));
        assert!(text.contains("No irrigation needed right now."));
        assert!(text.contains("NDVI 0.65"));
        assert!(text.contains("Confidence: "));
        assert!(!text.contains("ALERT"));
    }

    #[test]
    fn test_alert_and_low_confidence_lines() {
        let plot = plot();
        let evidence = EvidenceSet::new().with(satellite(0.48, Some(0.61), 6.0, 0.9));
        let draft = draft(&evidence);
        let text = advisory_text(&AdvisoryView {
            intent: Intent::HealthCheck,
            plot: &plot,
            draft: &draft,
            alert: draft.ndvi_drop,
            low_confidence: true,
            history: None,
        });
        assert!(text.contains("ALERT: NDVI fell from 0.61 to 0.48"));
        assert!(text.contains("Low confidence: no weather data"));
    }

    #[test]
    fn test_weekly_summary_includes_trend_and_cycle() {
        let plot = plot();
        let evidence = EvidenceSet::new()
            .with(satellite(0.66, None, 6.0, 0.9))
            .with(weather(vec![0.1, 0.1, 0.1], None, 1.0, 0.9));
        let draft = draft(&evidence);
        let history = IrrigationHistory {
            days_since_irrigation: Some(5),
            ndvi_history: vec![0.66, 0.62, 0.55],
        };
        let text = advisory_text(&AdvisoryView {
            intent: Intent::WeeklySummary,
            plot: &plot,
            draft: &draft,
            alert: None,
            low_confidence: false,
            history: Some(&history),
        });
        assert!(text.contains("Trend this period: improving"));
        assert!(text.contains("next cycle due in 2 day(s)"));
    }
}
