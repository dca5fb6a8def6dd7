use axum::{extract::State, routing::get, Json, Router};

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // A failing store still answers; the plot count just drops to zero
    let plots = state.store.list_plots().await.map(|p| p.len()).unwrap_or(0);
    let llm = state
        .config
        .llm
        .active_provider()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "keywords-only".to_string());

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        plots,
        llm,
        scheduler: state.config.scheduler.enabled,
    })
}
