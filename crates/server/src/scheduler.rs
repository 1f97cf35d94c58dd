//! Cron-driven scheduler for recurring scans.
//!
//! A single loop ticks once a minute, loads the enabled jobs, and
//! spawns one task per job whose next fire time has arrived. Job tasks
//! share one root cancellation token; [`Scheduler::stop`] cancels it
//! and waits for every in-flight task to return.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use declone_core::cronexpr;
use declone_core::types::Timestamp;
use declone_db::models::{ActionKind, DuplicateGroupStatus, JobAction, ScanRunStatus, ScheduledJob};
use declone_db::repositories::{DuplicateGroupRepo, ScanRunRepo, ScheduledJobRepo};
use declone_db::DbPool;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::AppError;
use crate::scanner::{ScanConfig, Scanner};

/// How often the job table is evaluated.
const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// How often a post-scan action waiter polls the run's state.
const ACTION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Evaluates scheduled jobs and launches their scans. A cheaply
/// cloneable handle; clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    pool: DbPool,
    scanner: Scanner,
    poll_interval: Duration,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    running: bool,
    cancel: Option<CancellationToken>,
    tracker: Option<TaskTracker>,
}

impl Scheduler {
    pub fn new(pool: DbPool, scanner: Scanner) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                scanner,
                poll_interval: ACTION_POLL_INTERVAL,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Start the evaluation loop. Idempotent: calling start on a running
    /// scheduler is a no-op.
    pub async fn start(&self) {
        let (cancel, tracker) = {
            let mut state = self.inner.state.lock().await;
            if state.running {
                return;
            }
            state.running = true;
            let cancel = CancellationToken::new();
            let tracker = TaskTracker::new();
            state.cancel = Some(cancel.clone());
            state.tracker = Some(tracker.clone());
            (cancel, tracker)
        };

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run(cancel, tracker).await;
        });
        tracing::info!("scheduler started");
    }

    /// Stop the scheduler: cancel every in-flight job task and wait for
    /// them to drain. Calling stop on a stopped scheduler returns
    /// immediately.
    pub async fn stop(&self) {
        let (cancel, tracker) = {
            let mut state = self.inner.state.lock().await;
            if !state.running {
                return;
            }
            state.running = false;
            (state.cancel.take(), state.tracker.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(tracker) = tracker {
            tracker.close();
            tracker.wait().await;
        }
        tracing::info!("scheduler stopped");
    }

    /// Re-parse a job's cron expression and persist the recomputed next
    /// fire time. Invoked when a job is created, edited, or re-enabled.
    pub async fn update_next_run(&self, job: &ScheduledJob) -> Result<Timestamp, AppError> {
        let next = cronexpr::next_after(&job.cron_expression, Local::now())?;
        ScheduledJobRepo::set_next_run(&self.inner.pool, job.id, next).await?;
        Ok(next)
    }

    async fn run(&self, cancel: CancellationToken, tracker: TaskTracker) {
        // The first tick fires immediately, giving one evaluation pass
        // right at startup.
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("scheduler loop exiting");
                    return;
                }
                _ = interval.tick() => {
                    self.check_jobs(&cancel, &tracker).await;
                }
            }
        }
    }

    /// Spawn a task for every enabled job whose fire time has arrived.
    async fn check_jobs(&self, cancel: &CancellationToken, tracker: &TaskTracker) {
        let jobs = match ScheduledJobRepo::enabled(&self.inner.pool).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "scheduler: failed to load jobs");
                return;
            }
        };

        let now = Utc::now();
        for job in jobs {
            let Some(next_run_at) = job.next_run_at else {
                continue;
            };
            if next_run_at > now {
                continue;
            }

            let scheduler = self.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                let job_id = job.id;
                let outcome = std::panic::AssertUnwindSafe(scheduler.run_job(cancel, job))
                    .catch_unwind()
                    .await;
                if outcome.is_err() {
                    tracing::error!(job_id, "scheduled job task panicked");
                }
            });
        }
    }

    async fn run_job(&self, cancel: CancellationToken, job: ScheduledJob) {
        if cancel.is_cancelled() {
            tracing::debug!(job_id = job.id, "job cancelled before start");
            return;
        }
        if job.paths.is_empty() {
            tracing::warn!(job_id = job.id, "no paths configured, skipping job");
            return;
        }

        tracing::info!(job_id = job.id, name = %job.name, "running scheduled job");

        let config = ScanConfig {
            paths: job.paths.clone(),
            options: job.options.clone(),
        };
        let run = match self.inner.scanner.start_scan(config, Some(job.id)).await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "failed to start scheduled scan");
                return;
            }
        };

        // An invalid expression leaves next_run_at untouched so the next
        // evaluation pass retries once the job is fixed.
        let next_run = match cronexpr::next_after(&job.cron_expression, Local::now()) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "invalid cron expression");
                return;
            }
        };
        if let Err(e) =
            ScheduledJobRepo::update_last_run(&self.inner.pool, job.id, Utc::now(), next_run).await
        {
            tracing::error!(job_id = job.id, error = %e, "failed to update job run times");
        }

        tracing::info!(
            job_id = job.id,
            run_id = run.id,
            next_run = %next_run,
            "started scheduled scan"
        );

        if job.action != JobAction::Scan {
            self.wait_and_execute_action(&cancel, run.id, &job).await;
        }
    }

    /// Poll the run until it leaves `running`; when it completed, apply
    /// the job's action to every still-pending group.
    async fn wait_and_execute_action(
        &self,
        cancel: &CancellationToken,
        run_id: i64,
        job: &ScheduledJob,
    ) {
        let mut poll = tokio::time::interval(self.inner.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = poll.tick() => {
                    let run = match ScanRunRepo::get(&self.inner.pool, run_id).await {
                        Ok(run) => run,
                        Err(e) => {
                            tracing::error!(run_id, error = %e, "failed to load scan run");
                            return;
                        }
                    };

                    if run.status == ScanRunStatus::Running {
                        continue;
                    }
                    if run.status != ScanRunStatus::Completed {
                        tracing::warn!(run_id, status = ?run.status, "scan did not complete, skipping action");
                        return;
                    }

                    let group_ids = match DuplicateGroupRepo::ids(
                        &self.inner.pool,
                        run_id,
                        Some(DuplicateGroupStatus::Pending),
                    )
                    .await
                    {
                        Ok(ids) => ids,
                        Err(e) => {
                            tracing::error!(run_id, error = %e, "failed to load duplicate groups");
                            return;
                        }
                    };
                    if group_ids.is_empty() {
                        tracing::info!(run_id, "no pending duplicate groups, nothing to do");
                        return;
                    }

                    let kind = if job.action == JobAction::ScanHardlink {
                        ActionKind::Hardlink
                    } else {
                        ActionKind::Reflink
                    };

                    match self
                        .inner
                        .scanner
                        .execute_action(run_id, &group_ids, kind, false, None)
                        .await
                    {
                        Ok(result) => tracing::info!(
                            run_id,
                            job_id = job.id,
                            action_id = result.action.id,
                            groups = group_ids.len(),
                            "executed post-scan action"
                        ),
                        Err(e) => {
                            tracing::error!(run_id, job_id = job.id, error = %e, "post-scan action failed")
                        }
                    }
                    return;
                }
            }
        }
    }

    #[cfg(test)]
    fn with_poll_interval(pool: DbPool, scanner: Scanner, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                scanner,
                poll_interval,
                state: Mutex::new(State::default()),
            }),
        }
    }
}
