//! Versioned schema migrations.
//!
//! Applied versions are recorded in `schema_migrations(version,
//! applied_at)`. Each migration runs inside its own transaction; a
//! failure rolls back and aborts the open, leaving the recorded version
//! untouched so the next start retries from the same point.

use crate::{DbPool, StoreError};

const MIGRATIONS: &[(i64, &str)] = &[
    (1, MIGRATION_001),
    (2, MIGRATION_002),
    (3, MIGRATION_003),
];

/// Bring the schema up to the latest version.
pub async fn migrate(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await?;

    for &(version, sql) in MIGRATIONS {
        if version <= current {
            continue;
        }

        let mut tx = pool.begin().await?;
        if let Err(source) = sqlx::raw_sql(sql).execute(&mut *tx).await {
            let _ = tx.rollback().await;
            return Err(StoreError::Migration { version, source });
        }
        if let Err(source) = sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await
        {
            let _ = tx.rollback().await;
            return Err(StoreError::Migration { version, source });
        }
        tx.commit()
            .await
            .map_err(|source| StoreError::Migration { version, source })?;

        tracing::info!(version, "applied schema migration");
    }

    Ok(())
}

const MIGRATION_001: &str = "
-- Recurring scan templates. Paths and glob lists are JSON arrays.
CREATE TABLE scheduled_jobs (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    paths TEXT NOT NULL DEFAULT '[]',
    min_size INTEGER NOT NULL DEFAULT 0,
    max_size INTEGER,
    include_patterns TEXT NOT NULL DEFAULT '[]',
    exclude_patterns TEXT NOT NULL DEFAULT '[]',
    include_hidden BOOLEAN NOT NULL DEFAULT 0,
    follow_links BOOLEAN NOT NULL DEFAULT 0,
    one_file_system BOOLEAN NOT NULL DEFAULT 0,
    no_ignore BOOLEAN NOT NULL DEFAULT 0,
    ignore_case BOOLEAN NOT NULL DEFAULT 0,
    max_depth INTEGER,
    cron_expression TEXT NOT NULL,
    action TEXT NOT NULL DEFAULT 'scan',
    enabled BOOLEAN NOT NULL DEFAULT 1,
    last_run_at DATETIME,
    next_run_at DATETIME,
    created_at DATETIME NOT NULL
);

-- One row per scan execution.
CREATE TABLE scan_runs (
    id INTEGER PRIMARY KEY,
    scheduled_job_id INTEGER REFERENCES scheduled_jobs(id) ON DELETE SET NULL,
    paths TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'running',
    started_at DATETIME NOT NULL,
    completed_at DATETIME,
    files_scanned INTEGER NOT NULL DEFAULT 0,
    bytes_scanned INTEGER NOT NULL DEFAULT 0,
    duplicate_groups INTEGER NOT NULL DEFAULT 0,
    duplicate_files INTEGER NOT NULL DEFAULT 0,
    wasted_bytes INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    min_size INTEGER NOT NULL DEFAULT 0,
    max_size INTEGER,
    include_patterns TEXT NOT NULL DEFAULT '[]',
    exclude_patterns TEXT NOT NULL DEFAULT '[]',
    include_hidden BOOLEAN NOT NULL DEFAULT 0,
    follow_links BOOLEAN NOT NULL DEFAULT 0,
    one_file_system BOOLEAN NOT NULL DEFAULT 0,
    no_ignore BOOLEAN NOT NULL DEFAULT 0,
    ignore_case BOOLEAN NOT NULL DEFAULT 0,
    max_depth INTEGER
);

CREATE INDEX idx_scan_runs_status ON scan_runs(status);
CREATE INDEX idx_scan_runs_started_at ON scan_runs(started_at);
CREATE INDEX idx_scan_runs_scheduled_job_id ON scan_runs(scheduled_job_id);

-- Duplicate groups stored for review before any action is taken.
CREATE TABLE duplicate_groups (
    id INTEGER PRIMARY KEY,
    scan_run_id INTEGER NOT NULL REFERENCES scan_runs(id) ON DELETE CASCADE,
    file_hash TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    file_count INTEGER NOT NULL,
    wasted_bytes INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    files TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX idx_duplicate_groups_scan_run_id ON duplicate_groups(scan_run_id);
CREATE INDEX idx_duplicate_groups_status ON duplicate_groups(status);

-- Deduplication actions taken against a run's groups (audit log).
CREATE TABLE actions (
    id INTEGER PRIMARY KEY,
    scan_run_id INTEGER NOT NULL REFERENCES scan_runs(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    groups_processed INTEGER NOT NULL DEFAULT 0,
    files_processed INTEGER NOT NULL DEFAULT 0,
    bytes_saved INTEGER NOT NULL DEFAULT 0,
    dry_run BOOLEAN NOT NULL DEFAULT 0,
    started_at DATETIME NOT NULL,
    completed_at DATETIME,
    status TEXT NOT NULL DEFAULT 'running',
    error_message TEXT
);

CREATE INDEX idx_actions_scan_run_id ON actions(scan_run_id);
CREATE INDEX idx_actions_started_at ON actions(started_at);
";

const MIGRATION_002: &str = "
-- User-tunable settings persisted across restarts.
CREATE TABLE settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT INTO settings (key, value) VALUES ('retention_days', '30');
";

const MIGRATION_003: &str = "
-- Per-day aggregate statistics for the dashboard.
CREATE TABLE daily_stats (
    date DATE PRIMARY KEY,
    scans_run INTEGER NOT NULL DEFAULT 0,
    groups_found INTEGER NOT NULL DEFAULT 0,
    files_found INTEGER NOT NULL DEFAULT 0,
    bytes_wasted INTEGER NOT NULL DEFAULT 0,
    bytes_saved INTEGER NOT NULL DEFAULT 0
);
";
