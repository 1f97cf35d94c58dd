//! Handlers for scheduled job management.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use declone_core::cronexpr;
use declone_core::types::DbId;
use declone_db::models::{NewScheduledJob, ScheduledJob};
use declone_db::repositories::{ScanRunRepo, ScheduledJobRepo};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/{id}", get(get_job).put(update_job).delete(delete_job))
        .route("/{id}/enable", post(enable_job))
        .route("/{id}/disable", post(disable_job))
}

#[derive(Debug, Serialize)]
struct JobListResponse {
    jobs: Vec<ScheduledJob>,
    /// Most recent scan run per job id, for the list view.
    last_run_ids: HashMap<DbId, DbId>,
}

fn validate_job(job: &NewScheduledJob, state: &AppState) -> Result<(), AppError> {
    if job.paths.is_empty() {
        return Err(AppError::BadRequest("at least one path is required".to_string()));
    }
    for path in &job.paths {
        if !state.config.is_path_allowed(path) {
            return Err(AppError::Forbidden(format!(
                "path {path:?} is outside the allowed scan paths"
            )));
        }
    }
    cronexpr::validate(&job.cron_expression)?;
    Ok(())
}

/// POST /api/jobs
async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<NewScheduledJob>,
) -> AppResult<impl IntoResponse> {
    validate_job(&body, &state)?;
    let next_run = cronexpr::next_after(&body.cron_expression, Local::now())?;
    let job = ScheduledJobRepo::create(&state.pool, &body, Some(next_run)).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/jobs
async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = ScheduledJobRepo::list(&state.pool).await?;
    let job_ids: Vec<DbId> = jobs.iter().map(|j| j.id).collect();
    let last_run_ids = ScanRunRepo::last_run_ids_for_jobs(&state.pool, &job_ids).await?;
    Ok(Json(DataResponse {
        data: JobListResponse { jobs, last_run_ids },
    }))
}

/// GET /api/jobs/{id}
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = ScheduledJobRepo::get(&state.pool, id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// PUT /api/jobs/{id}
///
/// Edits recompute the next fire time from the (possibly changed) cron
/// expression.
async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<NewScheduledJob>,
) -> AppResult<impl IntoResponse> {
    validate_job(&body, &state)?;
    let next_run = cronexpr::next_after(&body.cron_expression, Local::now())?;
    let job = ScheduledJobRepo::update(&state.pool, id, &body, Some(next_run)).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/jobs/{id}/enable
///
/// Re-enabling recomputes `next_run_at` so the job does not fire
/// immediately on the strength of a stale timestamp.
async fn enable_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = ScheduledJobRepo::get(&state.pool, id).await?;
    ScheduledJobRepo::set_enabled(&state.pool, id, true).await?;
    state.scheduler.update_next_run(&job).await?;
    let job = ScheduledJobRepo::get(&state.pool, id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/jobs/{id}/disable
async fn disable_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ScheduledJobRepo::set_enabled(&state.pool, id, false).await?;
    let job = ScheduledJobRepo::get(&state.pool, id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// DELETE /api/jobs/{id}
async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ScheduledJobRepo::get(&state.pool, id).await?;
    ScheduledJobRepo::delete(&state.pool, id).await?;
    Ok(Json(DataResponse { data: "deleted" }))
}
