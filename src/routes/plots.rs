use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::evidence::Plot;
use crate::models::AppState;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/plots", get(list_plots))
        .route("/api/plots/{id}", get(get_plot))
        .with_state(state)
}

async fn list_plots(State(state): State<AppState>) -> AppResult<Json<Vec<Plot>>> {
    Ok(Json(state.store.list_plots().await?))
}

async fn get_plot(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Plot>> {
    state
        .store
        .get_plot(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("plot '{}'", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::demo_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_lists_demo_plots() {
        let app = router(demo_state().await);
        let response = app
            .oneshot(Request::get("/api/plots").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let plots: Vec<Plot> = serde_json::from_slice(&body).unwrap();
        assert!(plots.iter().any(|p| p.id == "thurpu"));
    }

    #[tokio::test]
    async fn test_unknown_plot_is_404() {
        let app = router(demo_state().await);
        let response = app
            .oneshot(Request::get("/api/plots/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
