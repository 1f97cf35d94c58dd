//! Periodic cleanup of scan history past the retention horizon.
//!
//! Spawns from `main` and runs until its cancellation token trips. Each
//! pass resolves the effective retention (the persisted setting wins
//! unless pinned via the environment) and deletes completed runs,
//! actions, and daily stats older than the cutoff. Still-running scans
//! are never touched.

use std::sync::Arc;
use std::time::Duration;

use declone_db::repositories::{cleanup_old_data, SettingRepo, RETENTION_DAYS_KEY};
use declone_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::config::{parse_retention_days, Config};

/// How often the cleanup pass runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Run the retention sweep loop until `cancel` is triggered.
pub async fn run(pool: DbPool, config: Arc<Config>, cancel: CancellationToken) {
    tracing::info!(
        interval_hours = SWEEP_INTERVAL.as_secs() / 3600,
        "retention sweep started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    // Skip the immediate first tick; the first pass runs after one full
    // interval.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("retention sweep stopping");
                return;
            }
            _ = interval.tick() => {
                let retention_days = resolve_retention_days(&pool, &config).await;
                match cleanup_old_data(&pool, retention_days).await {
                    Ok(stats) if stats.total() > 0 => {
                        tracing::info!(
                            retention_days,
                            scan_runs = stats.scan_runs,
                            actions = stats.actions,
                            daily_stats = stats.daily_stats,
                            "retention sweep purged old rows"
                        );
                    }
                    Ok(_) => tracing::debug!(retention_days, "retention sweep: nothing to purge"),
                    Err(e) => tracing::error!(error = %e, "retention sweep failed"),
                }
            }
        }
    }
}

/// The effective retention horizon in days.
///
/// An environment-pinned value always wins; otherwise the persisted
/// setting applies when present and valid, falling back to the config
/// default.
pub async fn resolve_retention_days(pool: &DbPool, config: &Config) -> i64 {
    if config.retention_days_from_env {
        return config.retention_days;
    }
    match SettingRepo::get(pool, RETENTION_DAYS_KEY).await {
        Ok(Some(value)) => parse_retention_days(&value).unwrap_or(config.retention_days),
        Ok(None) => config.retention_days,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read retention setting");
            config.retention_days
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config(days: i64, from_env: bool) -> Config {
        Config {
            port: 8080,
            db_path: PathBuf::new(),
            retention_days: days,
            retention_days_from_env: from_env,
            scan_timeout: Duration::from_secs(60),
            allowed_paths: Vec::new(),
            fclones_path: None,
            fclones_cache: true,
        }
    }

    async fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let pool = declone_db::connect(&dir.path().join("test.db"))
            .await
            .expect("open database");
        declone_db::migrations::migrate(&pool).await.expect("migrate");
        (dir, pool)
    }

    #[tokio::test]
    async fn persisted_setting_overrides_the_default() {
        let (_dir, pool) = test_pool().await;
        SettingRepo::set(&pool, RETENTION_DAYS_KEY, "90").await.unwrap();

        assert_eq!(resolve_retention_days(&pool, &config(30, false)).await, 90);
    }

    #[tokio::test]
    async fn env_pinned_value_wins_over_the_setting() {
        let (_dir, pool) = test_pool().await;
        SettingRepo::set(&pool, RETENTION_DAYS_KEY, "90").await.unwrap();

        assert_eq!(resolve_retention_days(&pool, &config(14, true)).await, 14);
    }

    #[tokio::test]
    async fn invalid_setting_falls_back_to_the_config() {
        let (_dir, pool) = test_pool().await;
        SettingRepo::set(&pool, RETENTION_DAYS_KEY, "eleventy").await.unwrap();

        assert_eq!(resolve_retention_days(&pool, &config(30, false)).await, 30);
    }
}
