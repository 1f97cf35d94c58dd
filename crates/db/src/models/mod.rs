//! Row models for the store.
//!
//! Variable-length collections (paths, glob lists, file lists) live in
//! JSON text columns. Raw row structs derive [`sqlx::FromRow`] and are
//! converted into the public models, decoding the JSON columns along
//! the way.

mod action;
pub(crate) mod duplicate_group;
pub(crate) mod scan_run;
pub(crate) mod scheduled_job;
mod stats;

pub use action::{Action, ActionKind, ActionStatus};
pub use duplicate_group::{DuplicateGroup, DuplicateGroupStatus, NewDuplicateGroup};
pub use scan_run::{ScanCounters, ScanRun, ScanRunOptions, ScanRunStatus};
pub use scheduled_job::{JobAction, NewScheduledJob, ScheduledJob};
pub use stats::{DailyStats, DashboardStats};

use declone_core::types::DbId;

/// Decode a JSON list column, falling back to an empty list.
///
/// A corrupt column must not make the row unretrievable; the failure is
/// logged with the entity id and the field reads as its zero value.
pub(crate) fn decode_json_list(raw: &str, entity: &'static str, id: DbId) -> Vec<String> {
    match serde_json::from_str(raw) {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(entity, id, error = %e, "failed to decode JSON list column");
            Vec::new()
        }
    }
}

/// Encode a string list for storage in a JSON text column.
pub(crate) fn encode_json_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to encode JSON list column");
        "[]".to_string()
    })
}
