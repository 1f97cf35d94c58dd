use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use declone_db::repositories::{SettingRepo, RETENTION_DAYS_KEY};
use serde::{Deserialize, Serialize};

use crate::background::retention::resolve_retention_days;
use crate::config::RETENTION_DAYS_RANGE;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct SettingsResponse {
    retention_days: i64,
    /// When pinned via the environment the persisted value is ignored.
    retention_days_from_env: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateSettingsRequest {
    retention_days: i64,
}

/// GET /api/settings
async fn get_settings(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let retention_days = resolve_retention_days(&state.pool, &state.config).await;
    Ok(Json(DataResponse {
        data: SettingsResponse {
            retention_days,
            retention_days_from_env: state.config.retention_days_from_env,
        },
    }))
}

/// PUT /api/settings
async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<UpdateSettingsRequest>,
) -> AppResult<impl IntoResponse> {
    if !RETENTION_DAYS_RANGE.contains(&body.retention_days) {
        return Err(AppError::BadRequest(format!(
            "retention_days must be between {} and {}",
            RETENTION_DAYS_RANGE.start(),
            RETENTION_DAYS_RANGE.end()
        )));
    }
    SettingRepo::set(
        &state.pool,
        RETENTION_DAYS_KEY,
        &body.retention_days.to_string(),
    )
    .await?;
    Ok(Json(DataResponse {
        data: SettingsResponse {
            retention_days: body.retention_days,
            retention_days_from_env: state.config.retention_days_from_env,
        },
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_settings).put(update_settings))
}
