use declone_core::types::DbId;
use serde::{Deserialize, Serialize};

use super::decode_json_list;

/// Review state of a duplicate group. A group never moves back to
/// `pending` once processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DuplicateGroupStatus {
    Pending,
    Processed,
    Ignored,
}

/// One equivalence class of identical files within a run.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub id: DbId,
    pub scan_run_id: DbId,
    pub file_hash: String,
    pub file_size: i64,
    pub file_count: i64,
    /// file_size * (file_count - 1); derived at insert, not authoritative.
    pub wasted_bytes: i64,
    pub status: DuplicateGroupStatus,
    pub files: Vec<String>,
}

/// Insert payload for a duplicate group; status starts as `pending`.
#[derive(Debug, Clone)]
pub struct NewDuplicateGroup {
    pub scan_run_id: DbId,
    pub file_hash: String,
    pub file_size: i64,
    pub file_count: i64,
    pub wasted_bytes: i64,
    pub files: Vec<String>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DuplicateGroupRow {
    pub id: DbId,
    pub scan_run_id: DbId,
    pub file_hash: String,
    pub file_size: i64,
    pub file_count: i64,
    pub wasted_bytes: i64,
    pub status: DuplicateGroupStatus,
    pub files: String,
}

impl From<DuplicateGroupRow> for DuplicateGroup {
    fn from(row: DuplicateGroupRow) -> Self {
        DuplicateGroup {
            files: decode_json_list(&row.files, "duplicate group", row.id),
            id: row.id,
            scan_run_id: row.scan_run_id,
            file_hash: row.file_hash,
            file_size: row.file_size,
            file_count: row.file_count,
            wasted_bytes: row.wasted_bytes,
            status: row.status,
        }
    }
}
