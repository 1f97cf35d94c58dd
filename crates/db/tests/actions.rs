mod common;

use declone_db::models::{ActionKind, ActionStatus, ScanRunOptions};
use declone_db::repositories::{ActionRepo, ScanRunRepo};
use declone_db::StoreError;

#[tokio::test]
async fn create_and_complete_an_action() {
    let (_dir, pool) = common::test_pool().await;
    let run = ScanRunRepo::create(&pool, None, &["/data".to_string()], &ScanRunOptions::default())
        .await
        .unwrap();

    let action = ActionRepo::create(&pool, run.id, ActionKind::Hardlink, true)
        .await
        .unwrap();
    assert_eq!(action.status, ActionStatus::Running);
    assert!(action.dry_run);
    assert_eq!(action.bytes_saved, 0);
    assert!(action.completed_at.is_none());

    let completed = ActionRepo::complete(&pool, action.id, 2, 3, 5000, ActionStatus::Completed, None)
        .await
        .unwrap();
    assert_eq!(completed.status, ActionStatus::Completed);
    assert_eq!(completed.groups_processed, 2);
    assert_eq!(completed.files_processed, 3);
    assert_eq!(completed.bytes_saved, 5000);
    assert!(completed.completed_at.is_some());
}

#[tokio::test]
async fn failed_actions_keep_the_error_message() {
    let (_dir, pool) = common::test_pool().await;
    let run = ScanRunRepo::create(&pool, None, &["/data".to_string()], &ScanRunOptions::default())
        .await
        .unwrap();

    let action = ActionRepo::create(&pool, run.id, ActionKind::Remove, false)
        .await
        .unwrap();
    let failed = ActionRepo::complete(
        &pool,
        action.id,
        1,
        0,
        0,
        ActionStatus::Failed,
        Some("fclones remove failed with code Some(1)\nno such file"),
    )
    .await
    .unwrap();
    assert_eq!(failed.status, ActionStatus::Failed);
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("no such file"));
}

#[tokio::test]
async fn list_is_newest_first() {
    let (_dir, pool) = common::test_pool().await;
    let run = ScanRunRepo::create(&pool, None, &["/data".to_string()], &ScanRunOptions::default())
        .await
        .unwrap();

    let first = ActionRepo::create(&pool, run.id, ActionKind::Hardlink, false)
        .await
        .unwrap();
    let second = ActionRepo::create(&pool, run.id, ActionKind::Reflink, false)
        .await
        .unwrap();

    let listed = ActionRepo::list(&pool, 10, 0).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
}

#[tokio::test]
async fn complete_of_unknown_action_is_not_found() {
    let (_dir, pool) = common::test_pool().await;

    let err = ActionRepo::complete(&pool, 42, 0, 0, 0, ActionStatus::Completed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "action", id: 42 }));
}
