use std::time::Duration;

use anyhow::Result;
use casetrack_core::config::{AppConfig, LoadOptions};
use casetrack_server::{bootstrap, health};
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use casetrack_core::config::LogFormat::*;
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

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = app
        .delivery_worker
        .map(|worker| tokio::spawn(async move { worker.run(shutdown_rx).await }));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "casetrack-server started"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "casetrack-server stopping"
    );

    // The worker only stops between ticks; anything in flight stays pending in the store.
    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let drained = tokio::time::timeout(grace, async {
        app.complaints.flush_notifications().await;
        if let Some(handle) = worker_handle {
            let _ = handle.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "dispatch queue or delivery worker did not stop in time"
        );
    }
    app.db_pool.close().await;

    Ok(())
}
