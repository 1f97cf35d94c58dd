mod common;

use declone_core::types::DbId;
use declone_db::models::{
    DuplicateGroupStatus, NewDuplicateGroup, ScanRun, ScanRunOptions,
};
use declone_db::repositories::{
    DuplicateGroupQuery, DuplicateGroupRepo, GroupSortBy, ScanRunRepo, SortOrder,
};
use declone_db::{DbPool, StoreError};

async fn seed_run(pool: &DbPool) -> ScanRun {
    ScanRunRepo::create(
        pool,
        None,
        &["/data".to_string()],
        &ScanRunOptions::default(),
    )
    .await
    .unwrap()
}

fn group(run_id: DbId, hash: &str, size: i64, files: &[&str]) -> NewDuplicateGroup {
    NewDuplicateGroup {
        scan_run_id: run_id,
        file_hash: hash.to_string(),
        file_size: size,
        file_count: files.len() as i64,
        wasted_bytes: size * (files.len() as i64 - 1),
        files: files.iter().map(|f| f.to_string()).collect(),
    }
}

#[tokio::test]
async fn create_validates_input() {
    let (_dir, pool) = common::test_pool().await;
    let run = seed_run(&pool).await;

    let missing_run = NewDuplicateGroup {
        scan_run_id: 0,
        ..group(run.id, "aa", 100, &["/a", "/b"])
    };
    assert!(matches!(
        DuplicateGroupRepo::create(&pool, &missing_run).await,
        Err(StoreError::InvalidArgument(_))
    ));

    let missing_hash = NewDuplicateGroup {
        file_hash: String::new(),
        ..group(run.id, "aa", 100, &["/a", "/b"])
    };
    assert!(matches!(
        DuplicateGroupRepo::create(&pool, &missing_hash).await,
        Err(StoreError::InvalidArgument(_))
    ));

    let missing_files = NewDuplicateGroup {
        files: Vec::new(),
        ..group(run.id, "aa", 100, &["/a", "/b"])
    };
    assert!(matches!(
        DuplicateGroupRepo::create(&pool, &missing_files).await,
        Err(StoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn created_groups_start_pending() {
    let (_dir, pool) = common::test_pool().await;
    let run = seed_run(&pool).await;

    let created = DuplicateGroupRepo::create(&pool, &group(run.id, "aa", 1000, &["/a", "/b", "/c"]))
        .await
        .unwrap();
    assert_eq!(created.status, DuplicateGroupStatus::Pending);
    assert_eq!(created.file_count, 3);
    assert_eq!(created.wasted_bytes, 2000);

    let fetched = DuplicateGroupRepo::get(&pool, created.id).await.unwrap();
    assert_eq!(fetched.files, vec!["/a", "/b", "/c"]);
}

#[tokio::test]
async fn listing_sorts_filters_and_paginates() {
    let (_dir, pool) = common::test_pool().await;
    let run = seed_run(&pool).await;

    // wasted: aa=2000, bb=9000, cc=50
    DuplicateGroupRepo::create(&pool, &group(run.id, "aa", 1000, &["/a1", "/a2", "/a3"]))
        .await
        .unwrap();
    let bb = DuplicateGroupRepo::create(&pool, &group(run.id, "bb", 3000, &["/b1", "/b2", "/b3", "/b4"]))
        .await
        .unwrap();
    let cc = DuplicateGroupRepo::create(&pool, &group(run.id, "cc", 50, &["/c1", "/c2"]))
        .await
        .unwrap();

    // Default sort: wasted desc, unlimited.
    let all = DuplicateGroupRepo::list_paginated(
        &pool,
        &DuplicateGroupQuery {
            scan_run_id: run.id,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(
        all.iter().map(|g| g.file_hash.as_str()).collect::<Vec<_>>(),
        vec!["bb", "aa", "cc"]
    );

    // Sort by size ascending, page of one starting at the second row.
    let page = DuplicateGroupRepo::list_paginated(
        &pool,
        &DuplicateGroupQuery {
            scan_run_id: run.id,
            sort_by: GroupSortBy::Size,
            sort_order: SortOrder::Asc,
            limit: 1,
            offset: 1,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].file_hash, "aa");

    // Status filter applies identically to list, count, and ids.
    DuplicateGroupRepo::update_status(&pool, &[bb.id], DuplicateGroupStatus::Processed)
        .await
        .unwrap();

    let pending = DuplicateGroupRepo::list_paginated(
        &pool,
        &DuplicateGroupQuery {
            scan_run_id: run.id,
            status: Some(DuplicateGroupStatus::Pending),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(pending.len(), 2);

    let count = DuplicateGroupRepo::count(&pool, run.id, Some(DuplicateGroupStatus::Pending))
        .await
        .unwrap();
    assert_eq!(count, 2);

    let mut ids = DuplicateGroupRepo::ids(&pool, run.id, Some(DuplicateGroupStatus::Pending))
        .await
        .unwrap();
    ids.sort_unstable();
    let mut expected: Vec<DbId> = pending.iter().map(|g| g.id).collect();
    expected.sort_unstable();
    assert_eq!(ids, expected);
    assert!(!ids.contains(&bb.id));
    assert!(ids.contains(&cc.id));
}

#[tokio::test]
async fn bulk_status_update_handles_empty_input() {
    let (_dir, pool) = common::test_pool().await;

    DuplicateGroupRepo::update_status(&pool, &[], DuplicateGroupStatus::Processed)
        .await
        .unwrap();
}

#[tokio::test]
async fn deleting_a_run_cascades_to_its_groups() {
    let (_dir, pool) = common::test_pool().await;
    let run = seed_run(&pool).await;

    DuplicateGroupRepo::create(&pool, &group(run.id, "aa", 100, &["/a", "/b"]))
        .await
        .unwrap();
    DuplicateGroupRepo::create(&pool, &group(run.id, "bb", 200, &["/c", "/d"]))
        .await
        .unwrap();

    ScanRunRepo::delete(&pool, run.id).await.unwrap();

    let remaining = DuplicateGroupRepo::count(&pool, run.id, None).await.unwrap();
    assert_eq!(remaining, 0);
}
