mod common;

use declone_db::models::{NewScheduledJob, ScanCounters, ScanRunOptions, ScanRunStatus};
use declone_db::repositories::{ScanRunRepo, ScheduledJobRepo};
use declone_db::StoreError;

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn create_rejects_empty_paths() {
    let (_dir, pool) = common::test_pool().await;

    let err = ScanRunRepo::create(&pool, None, &[], &ScanRunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn create_and_get_round_trip() {
    let (_dir, pool) = common::test_pool().await;

    let options = ScanRunOptions {
        min_size: 1024,
        max_size: Some(1 << 30),
        include_patterns: paths(&["**/*.mkv"]),
        exclude_patterns: paths(&["**/.git/**"]),
        include_hidden: true,
        max_depth: Some(5),
        ..Default::default()
    };
    let run = ScanRunRepo::create(&pool, None, &paths(&["/data", "/media"]), &options)
        .await
        .unwrap();

    assert_eq!(run.status, ScanRunStatus::Running);
    assert!(run.completed_at.is_none());
    assert_eq!(run.paths, paths(&["/data", "/media"]));

    let fetched = ScanRunRepo::get(&pool, run.id).await.unwrap();
    assert_eq!(fetched.paths, run.paths);
    assert_eq!(fetched.options.min_size, 1024);
    assert_eq!(fetched.options.max_size, Some(1 << 30));
    assert_eq!(fetched.options.include_patterns, paths(&["**/*.mkv"]));
    assert_eq!(fetched.options.exclude_patterns, paths(&["**/.git/**"]));
    assert!(fetched.options.include_hidden);
    assert_eq!(fetched.options.max_depth, Some(5));
}

#[tokio::test]
async fn get_unknown_run_is_not_found() {
    let (_dir, pool) = common::test_pool().await;

    let err = ScanRunRepo::get(&pool, 999).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            entity: "scan run",
            id: 999
        }
    ));
}

#[tokio::test]
async fn update_progress_writes_counters_without_touching_status() {
    let (_dir, pool) = common::test_pool().await;

    let run = ScanRunRepo::create(&pool, None, &paths(&["/data"]), &ScanRunOptions::default())
        .await
        .unwrap();

    let counters = ScanCounters {
        files_scanned: 100,
        bytes_scanned: 1_000_000,
        duplicate_groups: 3,
        duplicate_files: 7,
        wasted_bytes: 4096,
    };
    ScanRunRepo::update_progress(&pool, run.id, &counters)
        .await
        .unwrap();

    let fetched = ScanRunRepo::get(&pool, run.id).await.unwrap();
    assert_eq!(fetched.files_scanned, 100);
    assert_eq!(fetched.bytes_scanned, 1_000_000);
    assert_eq!(fetched.duplicate_groups, 3);
    assert_eq!(fetched.duplicate_files, 7);
    assert_eq!(fetched.wasted_bytes, 4096);
    assert_eq!(fetched.status, ScanRunStatus::Running);
}

#[tokio::test]
async fn complete_records_the_terminal_state_exactly_once() {
    let (_dir, pool) = common::test_pool().await;

    let run = ScanRunRepo::create(&pool, None, &paths(&["/data"]), &ScanRunOptions::default())
        .await
        .unwrap();

    let first = ScanRunRepo::complete(&pool, run.id, ScanRunStatus::Cancelled, Some("Scan cancelled"))
        .await
        .unwrap();
    assert!(first);

    // A racing writer loses: the run is no longer in `running`.
    let second = ScanRunRepo::complete(&pool, run.id, ScanRunStatus::Completed, None)
        .await
        .unwrap();
    assert!(!second);

    let fetched = ScanRunRepo::get(&pool, run.id).await.unwrap();
    assert_eq!(fetched.status, ScanRunStatus::Cancelled);
    assert_eq!(fetched.error_message.as_deref(), Some("Scan cancelled"));
    assert!(fetched.completed_at.is_some());
}

#[tokio::test]
async fn complete_rejects_non_terminal_status() {
    let (_dir, pool) = common::test_pool().await;

    let run = ScanRunRepo::create(&pool, None, &paths(&["/data"]), &ScanRunOptions::default())
        .await
        .unwrap();
    let err = ScanRunRepo::complete(&pool, run.id, ScanRunStatus::Running, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn last_run_ids_map_one_query_per_job_set() {
    let (_dir, pool) = common::test_pool().await;

    let job = |name: &str| NewScheduledJob {
        name: name.to_string(),
        paths: paths(&["/data"]),
        options: ScanRunOptions::default(),
        cron_expression: "0 3 * * *".to_string(),
        action: declone_db::models::JobAction::Scan,
        enabled: true,
    };
    let job_a = ScheduledJobRepo::create(&pool, &job("a"), None).await.unwrap();
    let job_b = ScheduledJobRepo::create(&pool, &job("b"), None).await.unwrap();

    let opts = ScanRunOptions::default();
    ScanRunRepo::create(&pool, Some(job_a.id), &paths(&["/data"]), &opts)
        .await
        .unwrap();
    let latest_a = ScanRunRepo::create(&pool, Some(job_a.id), &paths(&["/data"]), &opts)
        .await
        .unwrap();
    let only_b = ScanRunRepo::create(&pool, Some(job_b.id), &paths(&["/data"]), &opts)
        .await
        .unwrap();

    let map = ScanRunRepo::last_run_ids_for_jobs(&pool, &[job_a.id, job_b.id, 999])
        .await
        .unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map[&job_a.id], latest_a.id);
    assert_eq!(map[&job_b.id], only_b.id);

    let empty = ScanRunRepo::last_run_ids_for_jobs(&pool, &[]).await.unwrap();
    assert!(empty.is_empty());
}
