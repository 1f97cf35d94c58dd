use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    engine_version: Option<String>,
}

/// Liveness probe; also reports the engine version when available.
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<HealthResponse> {
    let engine_version = state.executor.version().await.ok();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        engine_version,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
