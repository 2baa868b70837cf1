// Profile worker binary entry point
//
// Runs the background workers (currently the profile image checker) until a
// shutdown signal arrives, then stops them and waits for them to drain.

use anyhow::{Context, Result};
use common::bootstrap;
use common::config::Settings;
use common::telemetry;
use common::worker::WorkerManager;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(&settings.observability)?;
    telemetry::init_metrics(settings.observability.metrics_port)?;

    info!("Starting profile worker");

    let deps = bootstrap::init_dependencies(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize dependencies");
        e
    })?;

    let manager = WorkerManager::new(deps.clone());
    manager.start().context("Failed to start workers")?;

    info!("Workers are running. Press Ctrl+C to shutdown gracefully");

    let exit_on_unexpected_exit = settings.workers.exit_on_unexpected_exit;
    let mut failed_workers = Vec::new();

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        exited = manager.wait_for_unexpected_exit(), if exit_on_unexpected_exit => {
            error!(workers = ?exited, "Worker exited unexpectedly, shutting down");
            failed_workers = exited;
        }
    }

    if !exit_on_unexpected_exit {
        let degraded: Vec<&str> = manager
            .workers()
            .iter()
            .filter(|worker| worker.exited_unexpectedly())
            .map(|worker| worker.name())
            .collect();
        if !degraded.is_empty() {
            warn!(workers = ?degraded, "Ran degraded with exited workers");
        }
    }

    info!("Waiting for workers to finish in-flight messages");
    manager.stop().await;
    deps.close().await;
    telemetry::shutdown_tracer();

    if !failed_workers.is_empty() {
        anyhow::bail!("Workers exited unexpectedly: {}", failed_workers.join(", "));
    }

    info!("Profile worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
