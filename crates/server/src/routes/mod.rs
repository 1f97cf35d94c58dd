//! Route definitions for the JSON/SSE API.
//!
//! ```text
//! /health                      liveness probe (GET)
//! /api/dashboard               headline stats (GET)
//! /api/scans                   start, list (POST, GET)
//! /api/scans/{id}              run detail (GET)
//! /api/scans/{id}/cancel       cancel an active run (POST)
//! /api/scans/{id}/events       live progress stream (GET, SSE)
//! /api/scans/{id}/groups       duplicate group page (GET)
//! /api/scans/{id}/groups/ids   ids under the current filter (GET)
//! /api/scans/{id}/actions      execute a dedupe action (POST)
//! /api/actions                 action history (GET)
//! /api/jobs                    scheduled job CRUD
//! /api/settings                retention settings (GET, PUT)
//! ```

pub mod actions;
pub mod dashboard;
pub mod health;
pub mod jobs;
pub mod scans;
pub mod settings;

use axum::Router;

use crate::state::AppState;

/// Everything mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/dashboard", dashboard::router())
        .nest("/scans", scans::router())
        .nest("/actions", actions::router())
        .nest("/jobs", jobs::router())
        .nest("/settings", settings::router())
}
