use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use declone_db::repositories::StatsRepo;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/dashboard
async fn dashboard(State(state): State<AppState>) -> AppResult<Json<impl serde::Serialize>> {
    let stats = StatsRepo::dashboard(&state.pool).await?;
    Ok(Json(DataResponse { data: stats }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(dashboard))
}
