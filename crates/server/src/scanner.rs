//! Scan lifecycle management: starting and cancelling scans, fanning
//! progress out to subscribers, and executing deduplication actions.
//!
//! The scanner is the lifecycle authority for scan runs. Each run is
//! driven by one spawned task that owns the engine child process; the
//! task is the *sole* writer of the run's terminal state. Cancellation
//! only trips the run's token and lets the task record `cancelled`, so
//! a cancel racing completion can never produce a second terminal write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use declone_core::fclones::{
    self, DedupeOptions, Executor, FileGroup, LinkOptions, Progress, RemoveOptions,
};
use declone_core::types::DbId;
use declone_db::models::{
    Action, ActionKind, ActionStatus, DuplicateGroup, DuplicateGroupStatus, NewDuplicateGroup,
    ScanCounters, ScanRun, ScanRunOptions, ScanRunStatus,
};
use declone_db::repositories::{ActionRepo, DuplicateGroupRepo, ScanRunRepo, StatsRepo};
use declone_db::{DbPool, StoreError};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Capacity of each subscriber's delivery queue. A reader that falls
/// more than this far behind starts losing events.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 10;

/// Capacity of the engine-to-relay progress channel.
const PROGRESS_CHANNEL_CAPACITY: usize = 100;

/// Configuration for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    pub paths: Vec<String>,
    pub options: ScanRunOptions,
}

/// Progress snapshot delivered to subscribers (and serialized onto the
/// SSE channel by the HTTP layer).
#[derive(Debug, Clone, Serialize)]
pub struct ScanProgress {
    pub files_scanned: i64,
    pub bytes_scanned: i64,
    pub groups_found: i64,
    pub wasted_bytes: i64,
    pub status: ScanRunStatus,
    pub phase_num: u32,
    pub phase_total: u32,
    pub phase_name: String,
    pub phase_percent: f64,
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self {
            files_scanned: 0,
            bytes_scanned: 0,
            groups_found: 0,
            wasted_bytes: 0,
            status: ScanRunStatus::Running,
            phase_num: 0,
            phase_total: 0,
            phase_name: String::new(),
            phase_percent: 0.0,
        }
    }
}

impl ScanProgress {
    /// Synthesize a snapshot from a persisted row, for subscribers that
    /// arrive after the run already reached a terminal state.
    pub fn from_run(run: &ScanRun) -> Self {
        Self {
            files_scanned: run.files_scanned,
            bytes_scanned: run.bytes_scanned,
            groups_found: run.duplicate_groups,
            wasted_bytes: run.wasted_bytes,
            status: run.status,
            ..Default::default()
        }
    }
}

/// The read end of one subscriber queue. Dropping it detaches the
/// subscriber; the sender half is closed exactly once by the scanner.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<ScanProgress>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ScanProgress>,
}

/// The result of a deduplication action. When the engine fails, the
/// returned action carries status `failed` and its `error_message`; the
/// output text is whatever the engine printed either way.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub action: Action,
    pub output: String,
}

/// Orchestrates scan operations. A cheaply cloneable handle; clones
/// share the same state, so the HTTP layer and the scheduler can each
/// hold one.
#[derive(Clone)]
pub struct Scanner {
    inner: Arc<Inner>,
}

struct Inner {
    pool: DbPool,
    executor: Arc<dyn Executor>,
    scan_timeout: Duration,
    cache_enabled: bool,
    active_scans: Mutex<HashMap<DbId, CancellationToken>>,
    subscribers: RwLock<HashMap<DbId, Vec<Subscriber>>>,
    next_subscriber_id: AtomicU64,
}

impl Scanner {
    pub fn new(
        pool: DbPool,
        executor: Arc<dyn Executor>,
        scan_timeout: Duration,
        cache_enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                executor,
                scan_timeout,
                cache_enabled,
                active_scans: Mutex::new(HashMap::new()),
                subscribers: RwLock::new(HashMap::new()),
                next_subscriber_id: AtomicU64::new(1),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Attach a new bounded progress queue to a run.
    pub async fn subscribe(&self, run_id: DbId) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers
            .write()
            .await
            .entry(run_id)
            .or_default()
            .push(Subscriber { id, tx });
        Subscription { id, rx }
    }

    /// Detach one subscriber, closing its queue.
    pub async fn unsubscribe(&self, run_id: DbId, subscription_id: u64) {
        let mut subscribers = self.inner.subscribers.write().await;
        if let Some(list) = subscribers.get_mut(&run_id) {
            list.retain(|sub| sub.id != subscription_id);
            if list.is_empty() {
                subscribers.remove(&run_id);
            }
        }
    }

    /// Deliver a progress snapshot to every subscriber of a run.
    ///
    /// The sender list is snapshotted under the read lock and released
    /// before sending. Sends are non-blocking: a full queue drops the
    /// event for that reader only, never stalling the scan task or the
    /// other readers.
    async fn broadcast(&self, run_id: DbId, progress: ScanProgress) {
        let senders: Vec<mpsc::Sender<ScanProgress>> = {
            let subscribers = self.inner.subscribers.read().await;
            match subscribers.get(&run_id) {
                Some(list) => list.iter().map(|sub| sub.tx.clone()).collect(),
                None => return,
            }
        };
        for tx in senders {
            let _ = tx.try_send(progress.clone());
        }
    }

    /// Close every subscriber queue for a run. Senders are dropped here,
    /// which closes each queue exactly once.
    async fn close_subscribers(&self, run_id: DbId) {
        self.inner.subscribers.write().await.remove(&run_id);
    }

    // -----------------------------------------------------------------------
    // Scan lifecycle
    // -----------------------------------------------------------------------

    /// Create the scan run record and launch the scan task; the scan
    /// continues in the background while the fresh row is returned.
    pub async fn start_scan(
        &self,
        config: ScanConfig,
        scheduled_job_id: Option<DbId>,
    ) -> Result<ScanRun, StoreError> {
        let run =
            ScanRunRepo::create(&self.inner.pool, scheduled_job_id, &config.paths, &config.options)
                .await?;

        let cancel = CancellationToken::new();
        self.inner.active_scans
            .lock()
            .await
            .insert(run.id, cancel.clone());

        let scanner = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            // Panic containment: the cleanup below must run even if the
            // scan body blows up.
            let outcome = std::panic::AssertUnwindSafe(scanner.run_scan(run_id, config, cancel))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                tracing::error!(run_id, "scan task panicked");
            }
            scanner.inner.active_scans.lock().await.remove(&run_id);
            scanner.close_subscribers(run_id).await;
        });

        Ok(run)
    }

    /// Cancel an active scan's context. Idempotent, and a no-op for
    /// unknown or already-terminal runs; the terminal state itself is
    /// recorded by the scan task.
    pub async fn cancel_scan(&self, run_id: DbId) {
        if let Some(cancel) = self.inner.active_scans.lock().await.get(&run_id) {
            cancel.cancel();
        }
    }

    /// Cancel every active scan and wait for the scan tasks to drain.
    pub async fn shutdown(&self) {
        for cancel in self.inner.active_scans.lock().await.values() {
            cancel.cancel();
        }
        while !self.inner.active_scans.lock().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn run_scan(&self, run_id: DbId, config: ScanConfig, cancel: CancellationToken) {
        let started = Instant::now();
        tracing::info!(run_id, paths = ?config.paths, "starting scan");

        let (progress_tx, mut progress_rx) =
            mpsc::channel::<Progress>(PROGRESS_CHANNEL_CAPACITY);

        // Relay task: persist each progress event, fan it out, and
        // remember the last counters. The engine's header stats only
        // count files inside duplicate groups; the true scan totals live
        // in the progress stream, so the final write needs this snapshot.
        let relay = {
            let scanner = self.clone();
            tokio::spawn(async move {
                let mut last = Progress::default();
                while let Some(progress) = progress_rx.recv().await {
                    let counters = ScanCounters {
                        files_scanned: progress.files_scanned,
                        bytes_scanned: progress.bytes_scanned,
                        duplicate_groups: progress.groups_found,
                        duplicate_files: progress.files_matched,
                        wasted_bytes: progress.wasted_bytes,
                    };
                    if let Err(e) =
                        ScanRunRepo::update_progress(&scanner.inner.pool, run_id, &counters).await
                    {
                        tracing::warn!(run_id, error = %e, "failed to persist scan progress");
                    }
                    scanner
                        .broadcast(
                            run_id,
                            ScanProgress {
                                files_scanned: progress.files_scanned,
                                bytes_scanned: progress.bytes_scanned,
                                groups_found: progress.groups_found,
                                wasted_bytes: progress.wasted_bytes,
                                status: ScanRunStatus::Running,
                                phase_num: progress.phase_num,
                                phase_total: progress.phase_total,
                                phase_name: progress.phase_name.clone(),
                                phase_percent: progress.phase_percent,
                            },
                        )
                        .await;
                    last = progress;
                }
                last
            })
        };

        // The timeout is the run's deadline and the token its manual
        // cancel; either way the group future is dropped, which kills
        // the engine child via kill_on_drop.
        let opts = engine_options(&config, self.inner.cache_enabled);
        let outcome = tokio::time::timeout(
            self.inner.scan_timeout,
            cancel.run_until_cancelled(self.inner.executor.group(opts, progress_tx)),
        )
        .await;

        // The progress sender went down with the group future; drain the
        // relay so the remembered counters are final.
        let last_progress = relay.await.unwrap_or_default();

        match outcome {
            // Manual cancellation or deadline: both surface as cancelled.
            Err(_) | Ok(None) => {
                self.finish(run_id, ScanRunStatus::Cancelled, Some("Scan cancelled"))
                    .await;
                tracing::info!(run_id, elapsed = ?started.elapsed(), "scan cancelled");
            }
            Ok(Some(Err(err))) => {
                let message = err.to_string();
                self.finish(run_id, ScanRunStatus::Failed, Some(&message)).await;
                tracing::error!(run_id, elapsed = ?started.elapsed(), error = %message, "scan failed");
            }
            Ok(Some(Ok(output))) => {
                for group in &output.groups {
                    if group.files.len() < 2 {
                        continue;
                    }
                    let count = group.files.len() as i64;
                    let new_group = NewDuplicateGroup {
                        scan_run_id: run_id,
                        file_hash: group.file_hash.clone(),
                        file_size: group.file_len,
                        file_count: count,
                        wasted_bytes: group.file_len * (count - 1),
                        files: group.files.clone(),
                    };
                    if let Err(e) = DuplicateGroupRepo::create(&self.inner.pool, &new_group).await {
                        tracing::warn!(run_id, error = %e, "failed to store duplicate group");
                    }
                }

                let stats = output.header.stats;
                let counters = ScanCounters {
                    files_scanned: last_progress.files_scanned,
                    bytes_scanned: last_progress.bytes_scanned,
                    duplicate_groups: stats.group_count,
                    duplicate_files: stats.redundant_file_count,
                    wasted_bytes: stats.redundant_file_size,
                };
                if let Err(e) = ScanRunRepo::update_progress(&self.inner.pool, run_id, &counters).await {
                    tracing::warn!(run_id, error = %e, "failed to write final counters");
                }

                if let Err(e) =
                    ScanRunRepo::complete(&self.inner.pool, run_id, ScanRunStatus::Completed, None).await
                {
                    tracing::error!(run_id, error = %e, "failed to mark scan completed");
                }
                self.broadcast(
                    run_id,
                    ScanProgress {
                        files_scanned: counters.files_scanned,
                        bytes_scanned: counters.bytes_scanned,
                        groups_found: stats.group_count,
                        wasted_bytes: stats.redundant_file_size,
                        status: ScanRunStatus::Completed,
                        ..Default::default()
                    },
                )
                .await;

                if let Err(e) = StatsRepo::bump_daily(
                    &self.inner.pool,
                    chrono::Utc::now().date_naive(),
                    1,
                    stats.group_count,
                    stats.redundant_file_count,
                    stats.redundant_file_size,
                    0,
                )
                .await
                {
                    tracing::warn!(run_id, error = %e, "failed to update daily stats");
                }

                tracing::info!(
                    run_id,
                    elapsed = ?started.elapsed(),
                    groups = stats.group_count,
                    "scan completed"
                );
            }
        }
    }

    /// Record a non-success terminal state and tell subscribers.
    async fn finish(&self, run_id: DbId, status: ScanRunStatus, error_message: Option<&str>) {
        if let Err(e) = ScanRunRepo::complete(&self.inner.pool, run_id, status, error_message).await {
            tracing::error!(run_id, error = %e, "failed to record terminal scan state");
        }
        self.broadcast(
            run_id,
            ScanProgress {
                status,
                ..Default::default()
            },
        )
        .await;
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Run a deduplication action over the selected groups of a run.
    ///
    /// Group ids that no longer exist are silently skipped, so partial
    /// actions are permitted. With `dry_run` set the engine produces its
    /// plan but no group status changes. Engine failure is reported
    /// through the returned action's `failed` status and error message.
    pub async fn execute_action(
        &self,
        run_id: DbId,
        group_ids: &[DbId],
        kind: ActionKind,
        dry_run: bool,
        remove_priority: Option<String>,
    ) -> Result<ActionResult, StoreError> {
        let action = ActionRepo::create(&self.inner.pool, run_id, kind, dry_run).await?;

        let mut selected: Vec<DuplicateGroup> = Vec::new();
        for &group_id in group_ids {
            match DuplicateGroupRepo::get(&self.inner.pool, group_id).await {
                Ok(group) => selected.push(group),
                Err(StoreError::NotFound { .. }) => {
                    tracing::warn!(run_id, group_id, "skipping missing duplicate group");
                }
                Err(e) => return Err(e),
            }
        }

        let engine_groups: Vec<FileGroup> = selected
            .iter()
            .map(|g| FileGroup {
                file_len: g.file_size,
                file_hash: g.file_hash.clone(),
                files: g.files.clone(),
            })
            .collect();
        let input = self.inner.executor.group_to_input(&engine_groups);

        let result = match kind {
            ActionKind::Hardlink => {
                self.inner.executor
                    .link(&input, LinkOptions { dry_run, soft: false })
                    .await
            }
            ActionKind::Reflink => self.inner.executor.dedupe(&input, DedupeOptions { dry_run }).await,
            ActionKind::Remove => {
                self.inner.executor
                    .remove(
                        &input,
                        RemoveOptions {
                            dry_run,
                            priority: remove_priority,
                        },
                    )
                    .await
            }
        };

        match result {
            Err(err) => {
                let output = match &err {
                    fclones::EngineError::CommandFailed { output, .. } => output.clone(),
                    _ => String::new(),
                };
                let message = if output.is_empty() {
                    err.to_string()
                } else {
                    format!("{err}\n{output}")
                };
                tracing::error!(run_id, action_id = action.id, error = %err, "action failed");
                let action = ActionRepo::complete(
                    &self.inner.pool,
                    action.id,
                    selected.len() as i64,
                    0,
                    0,
                    ActionStatus::Failed,
                    Some(&message),
                )
                .await?;
                Ok(ActionResult { action, output })
            }
            Ok(output) => {
                // The engine's textual output carries no stable savings
                // figure, so the saved bytes are derived from the stored
                // group sizes. A lower bound when replicas were already
                // missing on disk.
                let bytes_saved: i64 = selected.iter().map(|g| g.wasted_bytes).sum();
                let files_processed: i64 = selected.iter().map(|g| g.file_count - 1).sum();

                if !dry_run {
                    let ids: Vec<DbId> = selected.iter().map(|g| g.id).collect();
                    DuplicateGroupRepo::update_status(
                        &self.inner.pool,
                        &ids,
                        DuplicateGroupStatus::Processed,
                    )
                    .await?;

                    if let Err(e) = StatsRepo::bump_daily(
                        &self.inner.pool,
                        chrono::Utc::now().date_naive(),
                        0,
                        0,
                        0,
                        0,
                        bytes_saved,
                    )
                    .await
                    {
                        tracing::warn!(run_id, error = %e, "failed to update daily stats");
                    }
                }

                let action = ActionRepo::complete(
                    &self.inner.pool,
                    action.id,
                    selected.len() as i64,
                    files_processed,
                    bytes_saved,
                    ActionStatus::Completed,
                    None,
                )
                .await?;
                tracing::info!(
                    run_id,
                    action_id = action.id,
                    groups = selected.len(),
                    bytes_saved,
                    dry_run,
                    "action completed"
                );
                Ok(ActionResult { action, output })
            }
        }
    }

    #[cfg(test)]
    async fn subscriber_count(&self, run_id: DbId) -> usize {
        self.inner.subscribers
            .read()
            .await
            .get(&run_id)
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    async fn active_scan_count(&self) -> usize {
        self.inner.active_scans.lock().await.len()
    }
}

/// Translate a scan config into the engine's option set.
fn engine_options(config: &ScanConfig, cache_enabled: bool) -> fclones::ScanOptions {
    fclones::ScanOptions {
        paths: config.paths.clone(),
        min_size: config.options.min_size,
        max_size: config.options.max_size,
        include_patterns: config.options.include_patterns.clone(),
        exclude_patterns: config.options.exclude_patterns.clone(),
        hash_fn: None,
        include_hidden: config.options.include_hidden,
        follow_links: config.options.follow_links,
        one_file_system: config.options.one_file_system,
        no_ignore: config.options.no_ignore,
        ignore_case: config.options.ignore_case,
        max_depth: config.options.max_depth,
        cache: cache_enabled,
    }
}
