use declone_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// What a deduplication action does to the files of its groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ActionKind {
    Hardlink,
    Reflink,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ActionStatus {
    Running,
    Completed,
    Failed,
}

/// One deduplication operation over a subset of a run's groups.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Action {
    pub id: DbId,
    pub scan_run_id: DbId,
    pub kind: ActionKind,
    pub groups_processed: i64,
    pub files_processed: i64,
    pub bytes_saved: i64,
    pub dry_run: bool,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub status: ActionStatus,
    pub error_message: Option<String>,
}
