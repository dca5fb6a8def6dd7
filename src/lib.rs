// Farm Advisor - bilingual crop advisories from satellite and weather evidence

pub mod agents;
pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod evidence;
pub mod intent;
pub mod language;
pub mod llm;
pub mod messages;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod scheduler;
pub mod translation;
pub mod types;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
