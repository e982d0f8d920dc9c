//! ODrive Daemon - Background synchronization service
//!
//! Runs as a systemd user service (see `odrive daemon start/stop/status`)
//! and drives the sync engine unattended:
//!
//! - Periodic polling of the configured account on `sync.poll_interval`.
//! - A filesystem watcher on the sync root that debounces local change
//!   bursts and requests an immediate sync once they settle.
//! - A Prometheus metrics endpoint for scraping.
//! - Crash reports written to the local report store on panic.
//!
//! The daemon currently drives a single account (the default account
//! configured via `odrive auth login`); a later revision will fan this
//! out per-account once multi-account storage lands in `IStateRepository`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use odrive_audit::AuditLogger;
use odrive_cache::pool::DatabasePool;
use odrive_cache::SqliteStateRepository;
use odrive_core::config::Config;
use odrive_core::domain::newtypes::SessionId;
use odrive_core::ports::state_repository::IStateRepository;
use odrive_graph::auth::KeyringTokenStorage;
use odrive_graph::client::GraphClient;
use odrive_graph::provider::GraphCloudProvider;
use odrive_sync::engine::SyncEngine;
use odrive_sync::filesystem::LocalFileSystemAdapter;
use odrive_sync::scheduler::SyncScheduler;
use odrive_sync::watcher::FileWatcher;
use odrive_telemetry::{install_crash_reporter, MetricsRegistry, MetricsServer};

/// Default bind address for the Prometheus metrics endpoint.
const METRICS_ADDR: &str = "127.0.0.1:9100";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load_or_default(&config_path);

    init_tracing(&config.logging.level);

    let reports_dir = dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("odrive")
        .join("reports");
    install_crash_reporter(reports_dir);

    info!(config_path = %config_path.display(), "ODrive daemon starting");

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let metrics = Arc::new(MetricsRegistry::new().context("Failed to initialize metrics")?);
    spawn_metrics_server(Arc::clone(&metrics), shutdown.clone());

    let db_path = dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("odrive")
        .join("odrive.db");
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let pool = DatabasePool::new(Path::new(&db_path))
        .await
        .context("Failed to open database")?;
    let state_repo: Arc<dyn IStateRepository> =
        Arc::new(SqliteStateRepository::new(pool.pool().clone()));
    let audit = AuditLogger::new(Arc::clone(&state_repo));

    run_daemon_loop(config, state_repo, audit, metrics, shutdown).await;

    info!("ODrive daemon stopped");
    Ok(())
}

/// Initializes the global tracing subscriber from the configured log level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Spawns a task that cancels `shutdown` on SIGTERM or SIGINT.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C");
        }

        shutdown.cancel();
    });
}

/// Spawns the Prometheus metrics HTTP server as a background task.
fn spawn_metrics_server(metrics: Arc<MetricsRegistry>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        match MetricsServer::new(metrics, METRICS_ADDR) {
            Ok(server) => {
                if let Err(e) = server.run(shutdown).await {
                    error!(error = %e, "Metrics server exited with error");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to start metrics server, continuing without it");
            }
        }
    });
}

/// Waits until a default account with stored tokens is configured,
/// retrying periodically so the daemon survives being started before login.
async fn wait_for_account(
    state_repo: &Arc<dyn IStateRepository>,
    shutdown: &CancellationToken,
) -> Option<odrive_core::domain::Account> {
    loop {
        if shutdown.is_cancelled() {
            return None;
        }

        match state_repo.get_default_account().await {
            Ok(Some(account)) => return Some(account),
            Ok(None) => {
                warn!("No account configured yet, run 'odrive auth login'. Retrying in 30s");
            }
            Err(e) => {
                error!(error = %e, "Failed to query default account, retrying in 30s");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(30)) => {}
            _ = shutdown.cancelled() => return None,
        }
    }
}

/// Main supervisory loop: waits for an authenticated account, then drives
/// periodic and watcher-triggered sync cycles until shutdown is requested.
async fn run_daemon_loop(
    config: Config,
    state_repo: Arc<dyn IStateRepository>,
    audit: AuditLogger,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
) {
    let Some(account) = wait_for_account(&state_repo, &shutdown).await else {
        return;
    };

    info!(email = %account.email(), "Found account, starting sync loop");

    let tokens = match KeyringTokenStorage::load(account.email().as_str()) {
        Ok(Some(t)) => t,
        Ok(None) => {
            error!("No tokens in keyring for configured account, run 'odrive auth login'");
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to load tokens from keyring");
            return;
        }
    };

    let graph_client = GraphClient::new(&tokens.access_token);
    let cloud_provider = Arc::new(GraphCloudProvider::new(graph_client));
    let local_fs = Arc::new(LocalFileSystemAdapter::new());
    let engine = SyncEngine::new(
        Arc::clone(&cloud_provider),
        Arc::clone(&state_repo),
        Arc::clone(&local_fs),
        &config,
    );

    let (mut watcher_opt, change_rx) = match FileWatcher::new(config.sync.debounce_delay * 1000) {
        Ok((watcher, rx)) => (Some(watcher), rx),
        Err(e) => {
            error!(error = %e, "Failed to create file watcher, continuing with polling only");
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            (None, rx)
        }
    };

    let sync_root = config.sync.root.clone();
    if let Some(watcher) = watcher_opt.as_mut() {
        if let Err(e) = watcher.watch(&sync_root) {
            error!(error = %e, root = %sync_root.display(), "Failed to watch sync root");
        }
    }

    let (mut scheduler, sync_requested) = SyncScheduler::new(
        change_rx,
        Duration::from_secs(config.sync.debounce_delay),
        Duration::from_millis(500),
    );

    let scheduler_shutdown = shutdown.clone();
    tokio::spawn(async move {
        // The watcher is moved into this task so it keeps watching for as
        // long as the scheduler is running.
        let _watcher = watcher_opt;

        tokio::select! {
            _ = scheduler.run() => {}
            _ = scheduler_shutdown.cancelled() => {}
        }
    });

    let mut poll_timer = tokio::time::interval(Duration::from_secs(config.sync.poll_interval));
    poll_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = poll_timer.tick() => {
                run_sync_cycle(&engine, &audit, &metrics).await;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                if sync_requested.swap(false, std::sync::atomic::Ordering::AcqRel) {
                    info!("Local changes settled, running sync");
                    run_sync_cycle(&engine, &audit, &metrics).await;
                }
            }
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, stopping sync loop");
                break;
            }
        }
    }
}

/// Runs one sync cycle, logging the outcome via the audit logger and
/// recording Prometheus counters.
async fn run_sync_cycle(engine: &SyncEngine, audit: &AuditLogger, metrics: &Arc<MetricsRegistry>) {
    let session_id = SessionId::new();
    audit.log_sync_start(session_id).await;

    match engine.sync().await {
        Ok(None) => {
            debug!("Sync already in progress, skipping this cycle");
        }
        Ok(Some(result)) => {
            info!(
                downloaded = result.files_downloaded,
                uploaded = result.files_uploaded,
                deleted = result.files_deleted,
                conflicts = result.conflicts_detected,
                errors = result.errors.len(),
                duration_ms = result.duration_ms,
                "Sync cycle completed"
            );

            metrics.sync_operations_total
                .with_label_values(&["cycle", if result.errors.is_empty() { "success" } else { "partial" }])
                .inc();

            audit
                .log_sync_complete(
                    session_id,
                    result.duration_ms,
                    result.files_downloaded,
                    result.files_uploaded,
                    result.files_deleted,
                    result.errors.len(),
                )
                .await;
        }
        Err(e) => {
            error!(error = %e, "Sync cycle failed");
            metrics
                .sync_operations_total
                .with_label_values(&["cycle", "failed"])
                .inc();
            audit.log_error(&format!("Sync cycle failed: {e}"), None).await;
        }
    }
}
