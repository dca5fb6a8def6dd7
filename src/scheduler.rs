//! Scheduled advisories
//!
//! Three timers, evaluated at the farm's local offset:
//!
//! | Kind            | When                    | Intent             |
//! |-----------------|-------------------------|--------------------|
//! | DailyMorning    | every day 07:00         | IRRIGATION_ADVICE  |
//! | SatelliteCheck  | 00:00, 06:00, 12:00, 18:00 | HEALTH_CHECK (alerts only) |
//! | WeeklySummary   | Sunday 08:00            | WEEKLY_SUMMARY     |
//!
//! Each firing builds one scheduled context per plot, runs it through the
//! pipeline and delivers the result to every configured recipient.

use chrono::{DateTime, Datelike, Days, FixedOffset, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::delivery::{Delivery, RetryingDelivery};
use crate::evidence::EvidenceStore;
use crate::intent::Intent;
use crate::pipeline::{PipelineHandle, RequestContext};
use crate::types::{AppError, AppResult};
use crate::uncertainty::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    DailyMorning,
    SatelliteCheck,
    WeeklySummary,
}

impl ScheduleKind {
    pub const ALL: [ScheduleKind; 3] = [
        ScheduleKind::DailyMorning,
        ScheduleKind::SatelliteCheck,
        ScheduleKind::WeeklySummary,
    ];

    pub fn intent(self) -> Intent {
        match self {
            ScheduleKind::DailyMorning => Intent::IrrigationAdvice,
            ScheduleKind::SatelliteCheck => Intent::HealthCheck,
            ScheduleKind::WeeklySummary => Intent::WeeklySummary,
        }
    }

    /// Path segment used by `/api/trigger/{kind}` and the CLI
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.trim().to_lowercase().as_str() {
            "morning" | "daily" | "daily_morning" => Some(ScheduleKind::DailyMorning),
            "satellite" | "satellite_check" => Some(ScheduleKind::SatelliteCheck),
            "weekly" | "weekly_summary" => Some(ScheduleKind::WeeklySummary),
            _ => None,
        }
    }

    fn hours(self) -> &'static [u32] {
        match self {
            ScheduleKind::DailyMorning => &[7],
            ScheduleKind::SatelliteCheck => &[0, 6, 12, 18],
            ScheduleKind::WeeklySummary => &[8],
        }
    }

    fn runs_on(self, weekday: Weekday) -> bool {
        match self {
            ScheduleKind::WeeklySummary => weekday == Weekday::Sun,
            _ => true,
        }
    }

    /// First firing strictly after `now`
    pub fn next_after(self, now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        let local = now.with_timezone(&offset);
        let today = local.date_naive();
        (0..=7u64)
            .filter_map(|d| today.checked_add_days(Days::new(d)))
            .filter(|date| self.runs_on(date.weekday()))
            .flat_map(|date| {
                self.hours()
                    .iter()
                    .filter_map(move |h| date.and_hms_opt(*h, 0, 0))
            })
            .filter_map(|naive| offset.from_local_datetime(&naive).single())
            .find(|t| *t > local)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| now + chrono::Duration::days(1))
    }

    /// Whether a result of this kind is worth sending
    fn should_deliver(self, outcome: Option<&Outcome>) -> bool {
        match self {
            ScheduleKind::SatelliteCheck => outcome.is_some_and(Outcome::is_alert),
            _ => true,
        }
    }
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleKind::DailyMorning => write!(f, "daily_morning"),
            ScheduleKind::SatelliteCheck => write!(f, "satellite_check"),
            ScheduleKind::WeeklySummary => write!(f, "weekly_summary"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerReport {
    pub plot_id: String,
    pub request_id: Uuid,
    pub alert: bool,
    pub low_confidence: bool,
    pub delivered: usize,
    pub failed: usize,
    pub message: String,
}

#[derive(Clone)]
pub struct Scheduler {
    pipeline: PipelineHandle,
    store: Arc<dyn EvidenceStore>,
    delivery: Arc<RetryingDelivery>,
    recipients: Vec<String>,
    offset: FixedOffset,
}

impl Scheduler {
    pub fn new(
        pipeline: PipelineHandle,
        store: Arc<dyn EvidenceStore>,
        delivery: Arc<RetryingDelivery>,
        recipients: Vec<String>,
        utc_offset_minutes: i32,
    ) -> AppResult<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!("invalid UTC offset: {} minutes", utc_offset_minutes))
        })?;
        Ok(Self {
            pipeline,
            store,
            delivery,
            recipients,
            offset,
        })
    }

    /// Runs one firing of `kind` for every plot
    pub async fn run_kind(&self, kind: ScheduleKind) -> AppResult<Vec<TriggerReport>> {
        let plots = self.store.list_plots().await?;
        info!(kind = %kind, plots = plots.len(), "Scheduled run started");

        let mut reports = Vec::with_capacity(plots.len());
        for plot in plots {
            let ctx = RequestContext::scheduled(kind, plot.id.clone(), self.delivery.channel());
            let ctx = self.pipeline.run(ctx).await?;

            let outcome = ctx.outcome.get();
            let (alert, low_confidence) = match outcome {
                Some(Outcome::Advisory { alert, low_confidence, .. }) => (alert.is_some(), *low_confidence),
                _ => (false, ctx.degraded),
            };
            let message = ctx.formatted.get().cloned().unwrap_or_default();

            let (mut delivered, mut failed) = (0, 0);
            if kind.should_deliver(outcome) && !message.is_empty() {
                for result in self.delivery.broadcast(&self.recipients, &message).await {
                    match result {
                        Ok(_) => delivered += 1,
                        Err(_) => failed += 1,
                    }
                }
            }

            reports.push(TriggerReport {
                plot_id: plot.id,
                request_id: ctx.request_id,
                alert,
                low_confidence,
                delivered,
                failed,
                message,
            });
        }
        Ok(reports)
    }

    /// Starts one background loop per schedule kind
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        if self.recipients.is_empty() {
            warn!("Scheduler has no recipients; advisories will be computed but not sent");
        }
        ScheduleKind::ALL
            .into_iter()
            .map(|kind| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.run_loop(kind).await })
            })
            .collect()
    }

    async fn run_loop(&self, kind: ScheduleKind) {
        loop {
            let now = Utc::now();
            let next = kind.next_after(now, self.offset);
            info!(kind = %kind, next = %next, "Next scheduled run");
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match self.run_kind(kind).await {
                Ok(reports) => info!(kind = %kind, plots = reports.len(), "Scheduled run finished"),
                Err(e) => error!(kind = %kind, error = %e, "Scheduled run failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisoryConfig;
    use crate::delivery::tests::RecordingDelivery;
    use crate::evidence::InMemoryEvidenceStore;
    use crate::intent::IntentResolver;
    use crate::pipeline::Pipeline;
    use std::time::Duration;

    async fn demo_scheduler(inner: Arc<RecordingDelivery>) -> Scheduler {
        let store: Arc<dyn EvidenceStore> = Arc::new(InMemoryEvidenceStore::demo().await);
        let pipeline = Pipeline::new(&AdvisoryConfig::default(), IntentResolver::keywords_only(), store.clone(), None);
        let delivery = Arc::new(RetryingDelivery::new(inner, 2, Duration::from_millis(10)));
        Scheduler::new(PipelineHandle::new(pipeline), store, delivery, vec!["farmer".into()], 330).unwrap()
    }

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn at(local: &str) -> DateTime<Utc> {
        DateTime::parse_from_str(&format!("{} +0530", local), "%Y-%m-%d %H:%M %z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_morning_is_next_7am_local() {
        let next = ScheduleKind::DailyMorning.next_after(at("2025-03-04 05:00"), ist());
        assert_eq!(next, at("2025-03-04 07:00"));
        let next = ScheduleKind::DailyMorning.next_after(at("2025-03-04 07:00"), ist());
        assert_eq!(next, at("2025-03-05 07:00"));
    }

    #[test]
    fn test_satellite_check_every_six_hours() {
        let next = ScheduleKind::SatelliteCheck.next_after(at("2025-03-04 13:30"), ist());
        assert_eq!(next, at("2025-03-04 18:00"));
        let next = ScheduleKind::SatelliteCheck.next_after(at("2025-03-04 19:00"), ist());
        assert_eq!(next, at("2025-03-05 00:00"));
    }

    #[test]
    fn test_weekly_summary_on_sunday() {
        // 2025-03-04 is a Tuesday
        let next = ScheduleKind::WeeklySummary.next_after(at("2025-03-04 10:00"), ist());
        assert_eq!(next, at("2025-03-09 08:00"));
        let next = ScheduleKind::WeeklySummary.next_after(at("2025-03-09 09:00"), ist());
        assert_eq!(next, at("2025-03-16 08:00"));
    }

    #[test]
    fn test_slugs() {
        assert_eq!(ScheduleKind::from_slug("morning"), Some(ScheduleKind::DailyMorning));
        assert_eq!(ScheduleKind::from_slug("Satellite"), Some(ScheduleKind::SatelliteCheck));
        assert_eq!(ScheduleKind::from_slug("weekly"), Some(ScheduleKind::WeeklySummary));
        assert_eq!(ScheduleKind::from_slug("hourly"), None);
    }

    #[test]
    fn test_intents() {
        assert_eq!(ScheduleKind::DailyMorning.intent(), Intent::IrrigationAdvice);
        assert_eq!(ScheduleKind::SatelliteCheck.intent(), Intent::HealthCheck);
        assert_eq!(ScheduleKind::WeeklySummary.intent(), Intent::WeeklySummary);
    }

    #[tokio::test]
    async fn test_satellite_check_only_sends_alerts() {
        let inner = Arc::new(RecordingDelivery::new(0));
        let reports = demo_scheduler(inner.clone())
            .await
            .run_kind(ScheduleKind::SatelliteCheck)
            .await
            .unwrap();
        assert_eq!(reports.len(), 3);
        let alerted: Vec<&str> = reports.iter().filter(|r| r.alert).map(|r| r.plot_id.as_str()).collect();
        assert_eq!(alerted, vec!["athota"]);
        let sent = inner.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("ALERT"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_morning_run_reaches_every_plot_despite_a_failure() {
        let inner = Arc::new(RecordingDelivery::new(1));
        let reports = demo_scheduler(inner.clone())
            .await
            .run_kind(ScheduleKind::DailyMorning)
            .await
            .unwrap();
        assert!(reports.iter().all(|r| r.delivered == 1 && r.failed == 0));
        assert_eq!(inner.sent.lock().unwrap().len(), 3);
    }
}
