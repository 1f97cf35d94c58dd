use std::sync::Arc;

use declone_core::fclones::Executor;
use declone_db::DbPool;

use crate::config::Config;
use crate::scanner::Scanner;
use crate::scheduler::Scheduler;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable; inner data is behind `Arc` or
/// is already a shared handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Server configuration.
    pub config: Arc<Config>,
    /// Engine driver, used directly for version/installation probes.
    pub executor: Arc<dyn Executor>,
    /// Scan lifecycle service.
    pub scanner: Scanner,
    /// Cron scheduler for recurring scans.
    pub scheduler: Scheduler,
}
