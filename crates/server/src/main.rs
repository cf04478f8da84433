mod bootstrap;
mod health;
mod http;
mod ingress;
mod messages;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use storefront_channel::ChannelRunner;
use storefront_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

use crate::http::AppState;
use crate::ingress::OrchestratorHandler;

fn init_logging(config: &AppConfig) {
    use storefront_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    app.reaper.start();

    let channel_runner =
        ChannelRunner::detached(Arc::new(OrchestratorHandler::new(Arc::clone(&app.orchestrator))));
    let channel_task = tokio::spawn(async move { channel_runner.start().await });

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let state = AppState { db_pool: app.db_pool.clone(), orchestrator: app.orchestrator };
    let bind_address = app.config.server.bind_address.clone();
    let port = app.config.server.port;
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.changed().await;
        };
        http::serve(&bind_address, port, state, shutdown).await
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        port,
        "storefront-server started"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "storefront-server stopping"
    );

    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish within the grace period"
        ),
    }
    channel_task.abort();
    app.reaper.stop().await;
    drop(app.reaper);

    // The writer exits once the last session store handle is gone.
    match tokio::time::timeout(grace, app.snapshot_writer).await {
        Ok(Ok(stats)) => tracing::info!(
            event_name = "session.snapshot.writer_stopped",
            correlation_id = "shutdown",
            written = stats.written,
            failed = stats.failed,
            "snapshot writer drained"
        ),
        Ok(Err(error)) => tracing::warn!(
            event_name = "session.snapshot.writer_failed",
            correlation_id = "shutdown",
            error = %error,
            "snapshot writer task failed"
        ),
        Err(_) => tracing::warn!(
            event_name = "session.snapshot.writer_timeout",
            correlation_id = "shutdown",
            "pending session snapshots were not flushed within the grace period"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}
