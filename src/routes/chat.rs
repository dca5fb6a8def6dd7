use axum::{extract::State, routing::post, Json, Router};
use std::time::Instant;
use tracing::info;

use crate::delivery::Channel;
use crate::models::{AppState, ChatRequest, ChatResponse};
use crate::pipeline::RequestContext;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .with_state(state)
}

pub async fn post_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    if request.message.trim().is_empty() {
        return Err(AppError::malformed("message must not be empty"));
    }
    let start = Instant::now();
    let channel = request.channel.unwrap_or(Channel::Ui);
    let ctx = RequestContext::interactive(request.message, channel, request.plot_id);
    info!(request_id = %ctx.request_id, channel = %channel, "Received chat request");

    let ctx = state.pipeline.run(ctx).await?;
    let response = ChatResponse::from_context(&ctx, start.elapsed().as_millis() as u64);

    info!(request_id = %response.request_id, kind = ?response.kind, "Chat response sent");
    Ok(Json(response))
}
