//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Whether the task queue accepts new jobs
    pub queue_running: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_running = state.service.queue().is_running();
    Json(HealthResponse {
        status: if queue_running { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        queue_running,
    })
}
