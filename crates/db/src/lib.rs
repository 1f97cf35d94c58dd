//! SQLite store for declone.
//!
//! All persistence goes through the typed repositories in
//! [`repositories`]; the schema is owned by the versioned migrations in
//! [`migrations`]. The database is opened in WAL mode so scan writers do
//! not block subscribers reading the same run.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub mod error;
pub mod migrations;
pub mod models;
pub mod repositories;

pub use error::StoreError;

pub type DbPool = sqlx::SqlitePool;

/// Open (creating if necessary) the database at `path` and return a pool.
///
/// WAL journaling gives concurrent readers while a scan writes; foreign
/// keys are enabled so deleting a scan run cascades to its duplicate
/// groups and actions.
pub async fn connect(path: &Path) -> Result<DbPool, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Cheap connectivity probe used at startup.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
