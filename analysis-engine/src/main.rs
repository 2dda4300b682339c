use anyhow::Result;
use std::future::Future;
use tokio::sync::watch;
use tracing::{error, info};

mod config;
mod queue;

use crate::config::Config;
use crate::queue::{Dependencies, Worker};
use shared::observability::init_logging;

/// Resolves on Ctrl-C, or on SIGTERM where available
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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

/// Run the worker until `signal` resolves, then drain in-flight deliveries
async fn run_until(worker: Worker, signal: impl Future<Output = ()>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(worker.start(shutdown_rx));

    tokio::select! {
        _ = signal => {
            info!("Received shutdown signal, draining in-flight deliveries");
            let _ = shutdown_tx.send(true);
            handle.await??;
        }
        finished = &mut handle => {
            finished??;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    config.validate()?;

    init_logging(config.logging.to_log_config("analysis-engine")?)?;

    info!(
        worker_id = %config.worker.worker_id,
        role = %config.worker.role,
        sandbox = ?config.sandbox,
        "Starting Analysis Engine"
    );

    let deps = Dependencies::connect(&config).await?;
    let worker = Worker::new(&config, deps);

    run_until(worker, shutdown_signal()).await?;

    info!("Analysis Engine stopped");
    Ok(())
}
