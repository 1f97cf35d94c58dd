use declone_db::DbPool;
use tempfile::TempDir;

/// Open a fresh migrated database in a temp directory.
///
/// The directory guard must be kept alive for the duration of the test.
pub async fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let pool = declone_db::connect(&dir.path().join("test.db"))
        .await
        .expect("open database");
    declone_db::migrations::migrate(&pool)
        .await
        .expect("run migrations");
    (dir, pool)
}
