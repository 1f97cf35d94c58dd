//! Repository for the `actions` table (deduplication audit log).

use chrono::Utc;
use declone_core::types::DbId;

use crate::models::{Action, ActionKind, ActionStatus};
use crate::{DbPool, StoreError};

const COLUMNS: &str = "\
    id, scan_run_id, kind, groups_processed, files_processed, bytes_saved, \
    dry_run, started_at, completed_at, status, error_message";

/// Provides CRUD operations for deduplication actions.
pub struct ActionRepo;

impl ActionRepo {
    /// Insert a new action with status `running` and zeroed counters.
    pub async fn create(
        pool: &DbPool,
        scan_run_id: DbId,
        kind: ActionKind,
        dry_run: bool,
    ) -> Result<Action, StoreError> {
        let query = format!(
            "INSERT INTO actions (scan_run_id, kind, dry_run, started_at, status) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Action>(&query)
            .bind(scan_run_id)
            .bind(kind)
            .bind(dry_run)
            .bind(Utc::now())
            .bind(ActionStatus::Running)
            .fetch_one(pool)
            .await?)
    }

    /// Find an action by its primary key.
    pub async fn get(pool: &DbPool, id: DbId) -> Result<Action, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM actions WHERE id = ?");
        sqlx::query_as::<_, Action>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "action",
                id,
            })
    }

    /// List actions newest-first with pagination.
    pub async fn list(pool: &DbPool, limit: i64, offset: i64) -> Result<Vec<Action>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM actions ORDER BY started_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        Ok(sqlx::query_as::<_, Action>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?)
    }

    /// Record the final counters and terminal status of an action.
    pub async fn complete(
        pool: &DbPool,
        id: DbId,
        groups_processed: i64,
        files_processed: i64,
        bytes_saved: i64,
        status: ActionStatus,
        error_message: Option<&str>,
    ) -> Result<Action, StoreError> {
        let query = format!(
            "UPDATE actions SET \
                 groups_processed = ?, files_processed = ?, bytes_saved = ?, \
                 completed_at = ?, status = ?, error_message = ? \
             WHERE id = ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Action>(&query)
            .bind(groups_processed)
            .bind(files_processed)
            .bind(bytes_saved)
            .bind(Utc::now())
            .bind(status)
            .bind(error_message)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "action",
                id,
            })
    }
}
