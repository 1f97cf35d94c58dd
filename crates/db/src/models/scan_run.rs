use declone_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

use super::decode_json_list;

/// Lifecycle of a scan run. `running` is the only non-terminal state;
/// transitions form the DAG running -> {completed, failed, cancelled}
/// and terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ScanRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanRunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ScanRunStatus::Running)
    }
}

/// Scan options recorded alongside a run (and mirrored on scheduled jobs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanRunOptions {
    #[serde(default)]
    pub min_size: i64,
    pub max_size: Option<i64>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub follow_links: bool,
    #[serde(default)]
    pub one_file_system: bool,
    #[serde(default)]
    pub no_ignore: bool,
    #[serde(default)]
    pub ignore_case: bool,
    pub max_depth: Option<i64>,
}

/// Running counters persisted while a scan is in flight and finalised
/// when it completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanCounters {
    pub files_scanned: i64,
    pub bytes_scanned: i64,
    pub duplicate_groups: i64,
    pub duplicate_files: i64,
    pub wasted_bytes: i64,
}

/// One execution of a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRun {
    pub id: DbId,
    pub scheduled_job_id: Option<DbId>,
    pub paths: Vec<String>,
    pub status: ScanRunStatus,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub files_scanned: i64,
    pub bytes_scanned: i64,
    pub duplicate_groups: i64,
    pub duplicate_files: i64,
    pub wasted_bytes: i64,
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub options: ScanRunOptions,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ScanRunRow {
    pub id: DbId,
    pub scheduled_job_id: Option<DbId>,
    pub paths: String,
    pub status: ScanRunStatus,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub files_scanned: i64,
    pub bytes_scanned: i64,
    pub duplicate_groups: i64,
    pub duplicate_files: i64,
    pub wasted_bytes: i64,
    pub error_message: Option<String>,
    pub min_size: i64,
    pub max_size: Option<i64>,
    pub include_patterns: String,
    pub exclude_patterns: String,
    pub include_hidden: bool,
    pub follow_links: bool,
    pub one_file_system: bool,
    pub no_ignore: bool,
    pub ignore_case: bool,
    pub max_depth: Option<i64>,
}

impl From<ScanRunRow> for ScanRun {
    fn from(row: ScanRunRow) -> Self {
        ScanRun {
            paths: decode_json_list(&row.paths, "scan run", row.id),
            options: ScanRunOptions {
                min_size: row.min_size,
                max_size: row.max_size,
                include_patterns: decode_json_list(&row.include_patterns, "scan run", row.id),
                exclude_patterns: decode_json_list(&row.exclude_patterns, "scan run", row.id),
                include_hidden: row.include_hidden,
                follow_links: row.follow_links,
                one_file_system: row.one_file_system,
                no_ignore: row.no_ignore,
                ignore_case: row.ignore_case,
                max_depth: row.max_depth,
            },
            id: row.id,
            scheduled_job_id: row.scheduled_job_id,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            files_scanned: row.files_scanned,
            bytes_scanned: row.bytes_scanned,
            duplicate_groups: row.duplicate_groups,
            duplicate_files: row.duplicate_files,
            wasted_bytes: row.wasted_bytes,
            error_message: row.error_message,
        }
    }
}
