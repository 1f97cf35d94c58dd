//! Retention cleanup of old scan data.

use chrono::{Duration, Utc};

use crate::models::ScanRunStatus;
use crate::{DbPool, StoreError};

/// Row counts removed by one [`cleanup_old_data`] pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupStats {
    pub scan_runs: u64,
    pub actions: u64,
    pub daily_stats: u64,
}

impl CleanupStats {
    pub fn total(&self) -> u64 {
        self.scan_runs + self.actions + self.daily_stats
    }
}

/// Delete data whose `completed_at` is older than the retention horizon.
///
/// A still-running scan is never deleted regardless of age; duplicate
/// groups go with their owning run via the cascade.
pub async fn cleanup_old_data(
    pool: &DbPool,
    retention_days: i64,
) -> Result<CleanupStats, StoreError> {
    let cutoff = Utc::now() - Duration::days(retention_days);

    let scan_runs = sqlx::query("DELETE FROM scan_runs WHERE completed_at < ? AND status != ?")
        .bind(cutoff)
        .bind(ScanRunStatus::Running)
        .execute(pool)
        .await?
        .rows_affected();

    let actions = sqlx::query("DELETE FROM actions WHERE completed_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let daily_stats = sqlx::query("DELETE FROM daily_stats WHERE date < ?")
        .bind(cutoff.date_naive())
        .execute(pool)
        .await?
        .rows_affected();

    Ok(CleanupStats {
        scan_runs,
        actions,
        daily_stats,
    })
}
