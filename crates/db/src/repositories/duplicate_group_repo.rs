//! Repository for the `duplicate_groups` table.

use declone_core::types::DbId;
use serde::Deserialize;

use crate::models::duplicate_group::DuplicateGroupRow;
use crate::models::{encode_json_list, DuplicateGroup, DuplicateGroupStatus, NewDuplicateGroup};
use crate::{DbPool, StoreError};

const COLUMNS: &str =
    "id, scan_run_id, file_hash, file_size, file_count, wasted_bytes, status, files";

/// Sort key for group listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupSortBy {
    #[default]
    Wasted,
    Size,
    Count,
    Hash,
    Status,
}

impl GroupSortBy {
    fn column(self) -> &'static str {
        match self {
            GroupSortBy::Wasted => "wasted_bytes",
            GroupSortBy::Size => "file_size",
            GroupSortBy::Count => "file_count",
            GroupSortBy::Hash => "file_hash",
            GroupSortBy::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query parameters for listing a run's duplicate groups.
///
/// `limit` of 0 means unlimited. The same filter semantics apply to
/// [`DuplicateGroupRepo::list_paginated`], [`DuplicateGroupRepo::count`],
/// and [`DuplicateGroupRepo::ids`].
#[derive(Debug, Clone, Default)]
pub struct DuplicateGroupQuery {
    pub scan_run_id: DbId,
    pub status: Option<DuplicateGroupStatus>,
    pub sort_by: GroupSortBy,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

/// Provides CRUD operations for duplicate groups.
pub struct DuplicateGroupRepo;

impl DuplicateGroupRepo {
    /// Insert a group with status `pending`.
    pub async fn create(
        pool: &DbPool,
        group: &NewDuplicateGroup,
    ) -> Result<DuplicateGroup, StoreError> {
        if group.scan_run_id == 0 {
            return Err(StoreError::InvalidArgument(
                "scan_run_id is required".to_string(),
            ));
        }
        if group.file_hash.is_empty() {
            return Err(StoreError::InvalidArgument(
                "file_hash is required".to_string(),
            ));
        }
        if group.files.is_empty() {
            return Err(StoreError::InvalidArgument(
                "files list must not be empty".to_string(),
            ));
        }

        let query = format!(
            "INSERT INTO duplicate_groups \
                 (scan_run_id, file_hash, file_size, file_count, wasted_bytes, status, files) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, DuplicateGroupRow>(&query)
            .bind(group.scan_run_id)
            .bind(&group.file_hash)
            .bind(group.file_size)
            .bind(group.file_count)
            .bind(group.wasted_bytes)
            .bind(DuplicateGroupStatus::Pending)
            .bind(encode_json_list(&group.files))
            .fetch_one(pool)
            .await?;
        Ok(row.into())
    }

    /// Find a duplicate group by its primary key.
    pub async fn get(pool: &DbPool, id: DbId) -> Result<DuplicateGroup, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM duplicate_groups WHERE id = ?");
        sqlx::query_as::<_, DuplicateGroupRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Into::into)
            .ok_or(StoreError::NotFound {
                entity: "duplicate group",
                id,
            })
    }

    /// List a run's groups with filtering, sorting, and pagination.
    pub async fn list_paginated(
        pool: &DbPool,
        q: &DuplicateGroupQuery,
    ) -> Result<Vec<DuplicateGroup>, StoreError> {
        let mut sql = format!("SELECT {COLUMNS} FROM duplicate_groups WHERE scan_run_id = ?");
        if q.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(&format!(
            " ORDER BY {} {}",
            q.sort_by.column(),
            q.sort_order.keyword()
        ));
        if q.limit > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = sqlx::query_as::<_, DuplicateGroupRow>(&sql).bind(q.scan_run_id);
        if let Some(status) = q.status {
            query = query.bind(status);
        }
        if q.limit > 0 {
            query = query.bind(q.limit).bind(q.offset);
        }

        let rows = query.fetch_all(pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Count a run's groups under the same filter as `list_paginated`.
    pub async fn count(
        pool: &DbPool,
        scan_run_id: DbId,
        status: Option<DuplicateGroupStatus>,
    ) -> Result<i64, StoreError> {
        let mut sql = "SELECT COUNT(*) FROM duplicate_groups WHERE scan_run_id = ?".to_string();
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(scan_run_id);
        if let Some(status) = status {
            query = query.bind(status);
        }
        Ok(query.fetch_one(pool).await?)
    }

    /// All group ids of a run under the same filter as `list_paginated`.
    /// Used by "select all with current filter" bulk operations.
    pub async fn ids(
        pool: &DbPool,
        scan_run_id: DbId,
        status: Option<DuplicateGroupStatus>,
    ) -> Result<Vec<DbId>, StoreError> {
        let mut sql = "SELECT id FROM duplicate_groups WHERE scan_run_id = ?".to_string();
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        let mut query = sqlx::query_scalar::<_, DbId>(&sql).bind(scan_run_id);
        if let Some(status) = status {
            query = query.bind(status);
        }
        Ok(query.fetch_all(pool).await?)
    }

    /// Bulk status update; a no-op for empty input.
    pub async fn update_status(
        pool: &DbPool,
        ids: &[DbId],
        status: DuplicateGroupStatus,
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("UPDATE duplicate_groups SET status = ? WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(status);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(pool).await?;
        Ok(())
    }
}
