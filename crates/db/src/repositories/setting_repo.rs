//! Repository for the `settings` key-value table.

use crate::{DbPool, StoreError};

/// Key for the data-retention horizon in days.
pub const RETENTION_DAYS_KEY: &str = "retention_days";

/// Provides access to persisted user-tunable settings.
pub struct SettingRepo;

impl SettingRepo {
    /// Fetch a setting value, `None` when the key has never been set.
    pub async fn get(pool: &DbPool, key: &str) -> Result<Option<String>, StoreError> {
        Ok(sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?)
    }

    /// Upsert a setting with last-write-wins semantics.
    pub async fn set(pool: &DbPool, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }
}
