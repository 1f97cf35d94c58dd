use declone_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

use super::scan_run::ScanRunOptions;
use super::decode_json_list;

/// What a scheduled job does once its scan finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobAction {
    /// Scan only; duplicates are left pending for manual review.
    Scan,
    /// Scan, then hardlink all pending groups.
    ScanHardlink,
    /// Scan, then reflink all pending groups.
    ScanReflink,
}

/// A recurring scan template evaluated by the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub id: DbId,
    pub name: String,
    pub paths: Vec<String>,
    #[serde(flatten)]
    pub options: ScanRunOptions,
    pub cron_expression: String,
    pub action: JobAction,
    pub enabled: bool,
    pub last_run_at: Option<Timestamp>,
    pub next_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Create/update payload for a scheduled job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewScheduledJob {
    pub name: String,
    pub paths: Vec<String>,
    #[serde(flatten)]
    pub options: ScanRunOptions,
    pub cron_expression: String,
    pub action: JobAction,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(sqlx::FromRow)]
pub(crate) struct ScheduledJobRow {
    pub id: DbId,
    pub name: String,
    pub paths: String,
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
    pub cron_expression: String,
    pub action: JobAction,
    pub enabled: bool,
    pub last_run_at: Option<Timestamp>,
    pub next_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<ScheduledJobRow> for ScheduledJob {
    fn from(row: ScheduledJobRow) -> Self {
        ScheduledJob {
            paths: decode_json_list(&row.paths, "scheduled job", row.id),
            options: ScanRunOptions {
                min_size: row.min_size,
                max_size: row.max_size,
                include_patterns: decode_json_list(&row.include_patterns, "scheduled job", row.id),
                exclude_patterns: decode_json_list(&row.exclude_patterns, "scheduled job", row.id),
                include_hidden: row.include_hidden,
                follow_links: row.follow_links,
                one_file_system: row.one_file_system,
                no_ignore: row.no_ignore,
                ignore_case: row.ignore_case,
                max_depth: row.max_depth,
            },
            id: row.id,
            name: row.name,
            cron_expression: row.cron_expression,
            action: row.action,
            enabled: row.enabled,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
            created_at: row.created_at,
        }
    }
}
