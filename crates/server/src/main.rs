use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use declone_core::fclones::{CliExecutor, Executor};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use declone_server::background::retention;
use declone_server::config::Config;
use declone_server::routes;
use declone_server::scanner::Scanner;
use declone_server::scheduler::Scheduler;
use declone_server::state::AppState;

/// HTTP request timeout. SSE endpoints hold their connections open, so
/// this only applies to the JSON routes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "declone=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = Arc::new(Config::from_env());
    tracing::info!(
        port = config.port,
        db_path = %config.db_path.display(),
        retention_days = config.retention_days,
        scan_timeout_secs = config.scan_timeout.as_secs(),
        "loaded configuration"
    );

    // --- Database ---
    let pool = declone_db::connect(&config.db_path)
        .await
        .expect("Failed to open database");
    declone_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    declone_db::migrations::migrate(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("database ready");

    // --- Engine ---
    let executor: Arc<dyn Executor> = Arc::new(match &config.fclones_path {
        Some(path) => CliExecutor::with_binary(path.clone()),
        None => CliExecutor::new(),
    });
    match executor.version().await {
        Ok(version) => tracing::info!(version, "fclones detected"),
        Err(e) => tracing::warn!(
            error = %e,
            "fclones not found; install it to enable scanning"
        ),
    }

    // --- Services ---
    let scanner = Scanner::new(
        pool.clone(),
        Arc::clone(&executor),
        config.scan_timeout,
        config.fclones_cache,
    );
    let scheduler = Scheduler::new(pool.clone(), scanner.clone());
    scheduler.start().await;

    // --- Retention sweep ---
    let retention_cancel = tokio_util::sync::CancellationToken::new();
    let retention_handle = tokio::spawn(retention::run(
        pool.clone(),
        Arc::clone(&config),
        retention_cancel.clone(),
    ));

    // --- App state and router ---
    let state = AppState {
        pool: pool.clone(),
        config: Arc::clone(&config),
        executor,
        scanner: scanner.clone(),
        scheduler: scheduler.clone(),
    };

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    // --- Serve ---
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("server stopped accepting connections, cleaning up");

    // The scheduler first: it waits for in-flight job tasks, which may
    // still be driving scans.
    scheduler.stop().await;

    // Then any remaining scans, then the background sweeps.
    scanner.shutdown().await;
    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;

    pool.close().await;
    tracing::info!("graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
