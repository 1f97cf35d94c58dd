use chrono::NaiveDate;
use serde::Serialize;

/// Per-day aggregate counters.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub scans_run: i64,
    pub groups_found: i64,
    pub files_found: i64,
    pub bytes_wasted: i64,
    pub bytes_saved: i64,
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DashboardStats {
    pub total_bytes_saved: i64,
    pub pending_groups: i64,
    pub scans_last_day: i64,
}
