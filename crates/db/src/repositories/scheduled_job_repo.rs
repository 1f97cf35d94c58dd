//! Repository for the `scheduled_jobs` table.

use chrono::Utc;
use declone_core::types::{DbId, Timestamp};

use crate::models::scheduled_job::ScheduledJobRow;
use crate::models::{encode_json_list, NewScheduledJob, ScheduledJob};
use crate::{DbPool, StoreError};

const COLUMNS: &str = "\
    id, name, paths, min_size, max_size, include_patterns, exclude_patterns, \
    include_hidden, follow_links, one_file_system, no_ignore, ignore_case, max_depth, \
    cron_expression, action, enabled, last_run_at, next_run_at, created_at";

/// Provides CRUD operations for scheduled jobs.
pub struct ScheduledJobRepo;

impl ScheduledJobRepo {
    /// Insert a new job. `next_run_at` is supplied by the caller, which
    /// is expected to have validated the cron expression.
    pub async fn create(
        pool: &DbPool,
        job: &NewScheduledJob,
        next_run_at: Option<Timestamp>,
    ) -> Result<ScheduledJob, StoreError> {
        if job.paths.is_empty() {
            return Err(StoreError::InvalidArgument(
                "job paths must not be empty".to_string(),
            ));
        }

        let query = format!(
            "INSERT INTO scheduled_jobs \
                 (name, paths, min_size, max_size, include_patterns, exclude_patterns, \
                  include_hidden, follow_links, one_file_system, no_ignore, ignore_case, max_depth, \
                  cron_expression, action, enabled, next_run_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScheduledJobRow>(&query)
            .bind(&job.name)
            .bind(encode_json_list(&job.paths))
            .bind(job.options.min_size)
            .bind(job.options.max_size)
            .bind(encode_json_list(&job.options.include_patterns))
            .bind(encode_json_list(&job.options.exclude_patterns))
            .bind(job.options.include_hidden)
            .bind(job.options.follow_links)
            .bind(job.options.one_file_system)
            .bind(job.options.no_ignore)
            .bind(job.options.ignore_case)
            .bind(job.options.max_depth)
            .bind(&job.cron_expression)
            .bind(job.action)
            .bind(job.enabled)
            .bind(next_run_at)
            .bind(Utc::now())
            .fetch_one(pool)
            .await?;
        Ok(row.into())
    }

    /// Find a scheduled job by its primary key.
    pub async fn get(pool: &DbPool, id: DbId) -> Result<ScheduledJob, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM scheduled_jobs WHERE id = ?");
        sqlx::query_as::<_, ScheduledJobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Into::into)
            .ok_or(StoreError::NotFound {
                entity: "scheduled job",
                id,
            })
    }

    /// All jobs, ordered by name.
    pub async fn list(pool: &DbPool) -> Result<Vec<ScheduledJob>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM scheduled_jobs ORDER BY name");
        let rows = sqlx::query_as::<_, ScheduledJobRow>(&query)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Enabled jobs only, ordered by their next fire time.
    pub async fn enabled(pool: &DbPool) -> Result<Vec<ScheduledJob>, StoreError> {
        let query =
            format!("SELECT {COLUMNS} FROM scheduled_jobs WHERE enabled = 1 ORDER BY next_run_at");
        let rows = sqlx::query_as::<_, ScheduledJobRow>(&query)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Replace a job's definition; timestamps other than `next_run_at`
    /// are left untouched.
    pub async fn update(
        pool: &DbPool,
        id: DbId,
        job: &NewScheduledJob,
        next_run_at: Option<Timestamp>,
    ) -> Result<ScheduledJob, StoreError> {
        if job.paths.is_empty() {
            return Err(StoreError::InvalidArgument(
                "job paths must not be empty".to_string(),
            ));
        }

        let query = format!(
            "UPDATE scheduled_jobs SET \
                 name = ?, paths = ?, min_size = ?, max_size = ?, \
                 include_patterns = ?, exclude_patterns = ?, \
                 include_hidden = ?, follow_links = ?, one_file_system = ?, \
                 no_ignore = ?, ignore_case = ?, max_depth = ?, \
                 cron_expression = ?, action = ?, enabled = ?, next_run_at = ? \
             WHERE id = ? \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScheduledJobRow>(&query)
            .bind(&job.name)
            .bind(encode_json_list(&job.paths))
            .bind(job.options.min_size)
            .bind(job.options.max_size)
            .bind(encode_json_list(&job.options.include_patterns))
            .bind(encode_json_list(&job.options.exclude_patterns))
            .bind(job.options.include_hidden)
            .bind(job.options.follow_links)
            .bind(job.options.one_file_system)
            .bind(job.options.no_ignore)
            .bind(job.options.ignore_case)
            .bind(job.options.max_depth)
            .bind(&job.cron_expression)
            .bind(job.action)
            .bind(job.enabled)
            .bind(next_run_at)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(Into::into).ok_or(StoreError::NotFound {
            entity: "scheduled job",
            id,
        })
    }

    /// Record a launch: `last_run_at` and the recomputed `next_run_at`.
    pub async fn update_last_run(
        pool: &DbPool,
        id: DbId,
        last_run_at: Timestamp,
        next_run_at: Timestamp,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE scheduled_jobs SET last_run_at = ?, next_run_at = ? WHERE id = ?")
            .bind(last_run_at)
            .bind(next_run_at)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Rewrite only the next fire time (used when a job is edited or
    /// re-enabled).
    pub async fn set_next_run(
        pool: &DbPool,
        id: DbId,
        next_run_at: Timestamp,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE scheduled_jobs SET next_run_at = ? WHERE id = ?")
            .bind(next_run_at)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Enable or disable a job. Disabled jobs are never evaluated.
    pub async fn set_enabled(pool: &DbPool, id: DbId, enabled: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE scheduled_jobs SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a job. Run history keeps its back-reference nulled out.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scheduled_jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
