//! Repository for the `scan_runs` table.

use std::collections::HashMap;

use chrono::Utc;
use declone_core::types::DbId;

use crate::models::scan_run::ScanRunRow;
use crate::models::{encode_json_list, ScanCounters, ScanRun, ScanRunOptions, ScanRunStatus};
use crate::{DbPool, StoreError};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, scheduled_job_id, paths, status, started_at, completed_at, \
    files_scanned, bytes_scanned, duplicate_groups, duplicate_files, wasted_bytes, error_message, \
    min_size, max_size, include_patterns, exclude_patterns, \
    include_hidden, follow_links, one_file_system, no_ignore, ignore_case, max_depth";

/// Provides CRUD operations for scan runs.
pub struct ScanRunRepo;

impl ScanRunRepo {
    /// Insert a new run with status `running` and `started_at` = now.
    ///
    /// Fails with `InvalidArgument` when `paths` is empty.
    pub async fn create(
        pool: &DbPool,
        scheduled_job_id: Option<DbId>,
        paths: &[String],
        options: &ScanRunOptions,
    ) -> Result<ScanRun, StoreError> {
        if paths.is_empty() {
            return Err(StoreError::InvalidArgument(
                "scan paths must not be empty".to_string(),
            ));
        }

        let query = format!(
            "INSERT INTO scan_runs \
                 (scheduled_job_id, paths, status, started_at, \
                  min_size, max_size, include_patterns, exclude_patterns, \
                  include_hidden, follow_links, one_file_system, no_ignore, ignore_case, max_depth) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScanRunRow>(&query)
            .bind(scheduled_job_id)
            .bind(encode_json_list(paths))
            .bind(ScanRunStatus::Running)
            .bind(Utc::now())
            .bind(options.min_size)
            .bind(options.max_size)
            .bind(encode_json_list(&options.include_patterns))
            .bind(encode_json_list(&options.exclude_patterns))
            .bind(options.include_hidden)
            .bind(options.follow_links)
            .bind(options.one_file_system)
            .bind(options.no_ignore)
            .bind(options.ignore_case)
            .bind(options.max_depth)
            .fetch_one(pool)
            .await?;
        Ok(row.into())
    }

    /// Find a scan run by its primary key.
    pub async fn get(pool: &DbPool, id: DbId) -> Result<ScanRun, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM scan_runs WHERE id = ?");
        sqlx::query_as::<_, ScanRunRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Into::into)
            .ok_or(StoreError::NotFound {
                entity: "scan run",
                id,
            })
    }

    /// List runs newest-first with pagination.
    pub async fn list(pool: &DbPool, limit: i64, offset: i64) -> Result<Vec<ScanRun>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM scan_runs ORDER BY started_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, ScanRunRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// The most recent run id for each of the given jobs, in one query.
    pub async fn last_run_ids_for_jobs(
        pool: &DbPool,
        job_ids: &[DbId],
    ) -> Result<HashMap<DbId, DbId>, StoreError> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; job_ids.len()].join(",");
        let query = format!(
            "SELECT scheduled_job_id, MAX(id) FROM scan_runs \
             WHERE scheduled_job_id IN ({placeholders}) \
             GROUP BY scheduled_job_id"
        );
        let mut q = sqlx::query_as::<_, (DbId, DbId)>(&query);
        for id in job_ids {
            q = q.bind(id);
        }
        Ok(q.fetch_all(pool).await?.into_iter().collect())
    }

    /// Best-effort write of the running counters. Does not touch status.
    pub async fn update_progress(
        pool: &DbPool,
        id: DbId,
        counters: &ScanCounters,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE scan_runs SET \
                 files_scanned = ?, bytes_scanned = ?, duplicate_groups = ?, \
                 duplicate_files = ?, wasted_bytes = ? \
             WHERE id = ?",
        )
        .bind(counters.files_scanned)
        .bind(counters.bytes_scanned)
        .bind(counters.duplicate_groups)
        .bind(counters.duplicate_files)
        .bind(counters.wasted_bytes)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a terminal state and `completed_at` = now.
    ///
    /// Guarded on `status = 'running'` so a terminal state is written at
    /// most once; returns whether this call performed the transition.
    pub async fn complete(
        pool: &DbPool,
        id: DbId,
        status: ScanRunStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidArgument(format!(
                "cannot complete a scan run with non-terminal status {status:?}"
            )));
        }

        let result = sqlx::query(
            "UPDATE scan_runs SET status = ?, completed_at = ?, error_message = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(error_message)
        .bind(id)
        .bind(ScanRunStatus::Running)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a run; duplicate groups and actions cascade.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scan_runs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
