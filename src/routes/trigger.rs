use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use tracing::info;

use crate::models::{AppState, TriggerResponse};
use crate::scheduler::ScheduleKind;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/trigger/{kind}", post(fire_trigger))
        .with_state(state)
}

/// POST /api/trigger/{kind} - run one scheduled firing now
async fn fire_trigger(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<TriggerResponse>> {
    let kind = ScheduleKind::from_slug(&kind)
        .ok_or_else(|| AppError::NotFound(format!("schedule kind '{}'", kind)))?;
    info!(kind = %kind, "Manual trigger");
    let reports = state.scheduler.run_kind(kind).await?;
    Ok(Json(TriggerResponse {
        kind: kind.to_string(),
        reports,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::demo_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_satellite_trigger_flags_dropping_plot() {
        let app = router(demo_state().await);
        let response = app
            .oneshot(Request::post("/api/trigger/satellite").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "satellite_check");
        let reports = json["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 3);
        let athota = reports.iter().find(|r| r["plot_id"] == "athota").unwrap();
        assert_eq!(athota["alert"], true);
        let munnagi = reports.iter().find(|r| r["plot_id"] == "munnagi").unwrap();
        assert_eq!(munnagi["alert"], false);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_404() {
        let app = router(demo_state().await);
        let response = app
            .oneshot(Request::post("/api/trigger/hourly").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
