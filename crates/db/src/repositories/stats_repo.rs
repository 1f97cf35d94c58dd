//! Repository for the `daily_stats` table and dashboard aggregates.

use chrono::NaiveDate;

use crate::models::{ActionStatus, DashboardStats, DuplicateGroupStatus};
use crate::{DbPool, StoreError};

/// Provides aggregate statistics queries.
pub struct StatsRepo;

impl StatsRepo {
    /// Add the given deltas to a day's aggregate row, creating it if
    /// necessary.
    pub async fn bump_daily(
        pool: &DbPool,
        date: NaiveDate,
        scans_run: i64,
        groups_found: i64,
        files_found: i64,
        bytes_wasted: i64,
        bytes_saved: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO daily_stats (date, scans_run, groups_found, files_found, bytes_wasted, bytes_saved) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(date) DO UPDATE SET \
                 scans_run = scans_run + excluded.scans_run, \
                 groups_found = groups_found + excluded.groups_found, \
                 files_found = files_found + excluded.files_found, \
                 bytes_wasted = bytes_wasted + excluded.bytes_wasted, \
                 bytes_saved = bytes_saved + excluded.bytes_saved",
        )
        .bind(date)
        .bind(scans_run)
        .bind(groups_found)
        .bind(files_found)
        .bind(bytes_wasted)
        .bind(bytes_saved)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Headline numbers for the dashboard.
    pub async fn dashboard(pool: &DbPool) -> Result<DashboardStats, StoreError> {
        let total_bytes_saved: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(bytes_saved), 0) FROM actions WHERE status = ? AND dry_run = 0",
        )
        .bind(ActionStatus::Completed)
        .fetch_one(pool)
        .await?;

        let pending_groups: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM duplicate_groups WHERE status = ?")
                .bind(DuplicateGroupStatus::Pending)
                .fetch_one(pool)
                .await?;

        let scans_last_day: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scan_runs WHERE started_at > ?")
                .bind(chrono::Utc::now() - chrono::Duration::days(1))
                .fetch_one(pool)
                .await?;

        Ok(DashboardStats {
            total_bytes_saved,
            pending_groups,
            scans_last_day,
        })
    }
}
