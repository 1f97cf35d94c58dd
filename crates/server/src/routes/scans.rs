//! Handlers for scan lifecycle endpoints, including the SSE progress
//! stream.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use declone_core::types::DbId;
use declone_db::models::{ActionKind, DuplicateGroupStatus, ScanRunOptions};
use declone_db::repositories::{
    DuplicateGroupQuery, DuplicateGroupRepo, GroupSortBy, ScanRunRepo, SortOrder,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::scanner::{ScanConfig, ScanProgress, Subscription};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_scan).get(list_scans))
        .route("/{id}", get(get_scan))
        .route("/{id}/cancel", post(cancel_scan))
        .route("/{id}/events", get(scan_events))
        .route("/{id}/groups", get(list_groups))
        .route("/{id}/groups/ids", get(group_ids))
        .route("/{id}/groups/status", post(update_group_status))
        .route("/{id}/actions", post(execute_action))
}

// ---------------------------------------------------------------------------
// Request/response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StartScanRequest {
    paths: Vec<String>,
    #[serde(flatten)]
    options: ScanRunOptions,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GroupListQuery {
    status: Option<DuplicateGroupStatus>,
    sort_by: Option<GroupSortBy>,
    sort_order: Option<SortOrder>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GroupPage {
    groups: Vec<declone_db::models::DuplicateGroup>,
    total: i64,
}

#[derive(Debug, Deserialize)]
struct UpdateGroupStatusRequest {
    group_ids: Vec<DbId>,
    status: DuplicateGroupStatus,
}

#[derive(Debug, Deserialize)]
struct ExecuteActionRequest {
    group_ids: Vec<DbId>,
    kind: ActionKind,
    dry_run: bool,
    priority: Option<String>,
}

const DEFAULT_LIST_LIMIT: i64 = 50;

// ---------------------------------------------------------------------------
// Scan lifecycle
// ---------------------------------------------------------------------------

/// POST /api/scans
async fn start_scan(
    State(state): State<AppState>,
    Json(body): Json<StartScanRequest>,
) -> AppResult<impl IntoResponse> {
    if body.paths.is_empty() {
        return Err(AppError::BadRequest("at least one path is required".to_string()));
    }
    for path in &body.paths {
        if !state.config.is_path_allowed(path) {
            return Err(AppError::Forbidden(format!(
                "path {path:?} is outside the allowed scan paths"
            )));
        }
    }

    // Scans refuse to start without a working engine.
    if let Err(e) = state.executor.check_installed().await {
        return Err(AppError::Unavailable(format!("fclones is not available: {e}")));
    }

    let run = state
        .scanner
        .start_scan(
            ScanConfig {
                paths: body.paths,
                options: body.options,
            },
            None,
        )
        .await?;
    Ok(Json(DataResponse { data: run }))
}

/// GET /api/scans
async fn list_scans(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let runs = ScanRunRepo::list(
        &state.pool,
        query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        query.offset.unwrap_or(0),
    )
    .await?;
    Ok(Json(DataResponse { data: runs }))
}

/// GET /api/scans/{id}
async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let run = ScanRunRepo::get(&state.pool, id).await?;
    Ok(Json(DataResponse { data: run }))
}

/// POST /api/scans/{id}/cancel
///
/// Idempotent: cancelling an unknown or already-terminal run is a no-op.
async fn cancel_scan(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.scanner.cancel_scan(id).await;
    Ok(Json(DataResponse { data: "cancelling" }))
}

// ---------------------------------------------------------------------------
// Progress stream
// ---------------------------------------------------------------------------

/// GET /api/scans/{id}/events
///
/// Emits `progress` events while the scan runs and one final `complete`
/// event when its feed closes. A subscriber arriving after the run is
/// already terminal gets a single snapshot from the persisted row.
async fn scan_events(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before reading the row so no live events are missed in
    // between.
    let subscription = state.scanner.subscribe(id).await;
    let run = match ScanRunRepo::get(&state.pool, id).await {
        Ok(run) => run,
        Err(e) => {
            state.scanner.unsubscribe(id, subscription.id).await;
            return Err(e.into());
        }
    };

    let initial = if run.status.is_terminal() {
        state.scanner.unsubscribe(id, subscription.id).await;
        SseState::Snapshot(ScanProgress::from_run(&run))
    } else {
        SseState::Live(subscription)
    };

    let stream = futures::stream::unfold(initial, |sse_state| async move {
        match sse_state {
            SseState::Snapshot(progress) => {
                Some((Ok(progress_event(&progress)), SseState::Complete))
            }
            SseState::Live(mut subscription) => match subscription.rx.recv().await {
                Some(progress) => {
                    Some((Ok(progress_event(&progress)), SseState::Live(subscription)))
                }
                None => Some((Ok(complete_event()), SseState::Done)),
            },
            SseState::Complete => Some((Ok(complete_event()), SseState::Done)),
            SseState::Done => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

enum SseState {
    /// Emit one snapshot from the persisted row, then complete.
    Snapshot(ScanProgress),
    /// Forward the live feed until it closes.
    Live(Subscription),
    Complete,
    Done,
}

fn progress_event(progress: &ScanProgress) -> Event {
    match Event::default().event("progress").json_data(progress) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode progress event");
            Event::default().event("progress").data("{}")
        }
    }
}

fn complete_event() -> Event {
    Event::default().event("complete").data("{}")
}

// ---------------------------------------------------------------------------
// Duplicate groups
// ---------------------------------------------------------------------------

/// GET /api/scans/{id}/groups
async fn list_groups(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<GroupListQuery>,
) -> AppResult<impl IntoResponse> {
    let db_query = DuplicateGroupQuery {
        scan_run_id: id,
        status: query.status,
        sort_by: query.sort_by.unwrap_or_default(),
        sort_order: query.sort_order.unwrap_or_default(),
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        offset: query.offset.unwrap_or(0),
    };
    let groups = DuplicateGroupRepo::list_paginated(&state.pool, &db_query).await?;
    let total = DuplicateGroupRepo::count(&state.pool, id, query.status).await?;
    Ok(Json(DataResponse {
        data: GroupPage { groups, total },
    }))
}

/// GET /api/scans/{id}/groups/ids
///
/// All group ids under the current filter, for "select all" flows.
async fn group_ids(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<GroupListQuery>,
) -> AppResult<impl IntoResponse> {
    let ids = DuplicateGroupRepo::ids(&state.pool, id, query.status).await?;
    Ok(Json(DataResponse { data: ids }))
}

/// POST /api/scans/{id}/groups/status
///
/// Bulk mark groups as ignored or restore them to pending. Groups are
/// only ever marked processed by running an action, and a processed
/// group never moves back, so such requests and targets are refused or
/// skipped.
async fn update_group_status(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<UpdateGroupStatusRequest>,
) -> AppResult<impl IntoResponse> {
    if body.status == DuplicateGroupStatus::Processed {
        return Err(AppError::BadRequest(
            "groups are marked processed by executing an action".to_string(),
        ));
    }

    let mut ids = Vec::new();
    for &group_id in &body.group_ids {
        match DuplicateGroupRepo::get(&state.pool, group_id).await {
            Ok(group)
                if group.scan_run_id == id
                    && group.status != DuplicateGroupStatus::Processed =>
            {
                ids.push(group_id);
            }
            Ok(_) => {}
            Err(declone_db::StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    DuplicateGroupRepo::update_status(&state.pool, &ids, body.status).await?;
    Ok(Json(DataResponse { data: ids.len() }))
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// POST /api/scans/{id}/actions
///
/// Runs a hardlink/reflink/remove action over the selected groups. The
/// response carries the action row (whose status reports engine
/// failures) and the engine's textual output for the preview pane.
async fn execute_action(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<ExecuteActionRequest>,
) -> AppResult<impl IntoResponse> {
    if body.group_ids.is_empty() {
        return Err(AppError::BadRequest("at least one group id is required".to_string()));
    }

    // The run must exist, even though missing individual groups are
    // tolerated.
    ScanRunRepo::get(&state.pool, id).await?;

    let result = state
        .scanner
        .execute_action(id, &body.group_ids, body.kind, body.dry_run, body.priority)
        .await?;
    Ok(Json(DataResponse { data: result }))
}
