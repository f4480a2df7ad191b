//! Daemon lifecycle: scheduler, idle tracking, and signal handling.
//!
//! | signal          | effect                                 |
//! |-----------------|----------------------------------------|
//! | SIGUSR1         | relay `Idle` (poll totals accumulate)  |
//! | SIGUSR2         | relay `Unidle` (poll totals reset)     |
//! | ctrl-c, SIGTERM | stop the scheduler and exit            |

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mailpoll_engine::{PollScheduler, Update};

use crate::config::Config;
use crate::services;

/// Run the daemon until a shutdown signal arrives.
pub async fn run_daemon(config: &Config, interval: Duration) -> anyhow::Result<()> {
    let pipeline = services::build(config)?;
    tracing::info!(
        sources = pipeline.manager.sources().len(),
        interval_secs = interval.as_secs(),
        "mailpoll daemon starting"
    );

    let cancel = CancellationToken::new();
    let idle_handle = tokio::spawn(
        Arc::clone(&pipeline.manager).track_idle(pipeline.relay.watch_idle(), cancel.clone()),
    );

    let mut scheduler = PollScheduler::new(Arc::clone(&pipeline.manager), interval);
    scheduler.start();

    wait_for_shutdown(&pipeline.relay).await?;

    scheduler.shutdown().await;
    cancel.cancel();
    if let Err(e) = idle_handle.await {
        tracing::error!("idle tracker failed: {e}");
    }
    if pipeline.manager.is_polling() {
        tracing::info!("a poll is still running; exiting without waiting for it");
    }
    tracing::info!("mailpoll daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(relay: &mailpoll_engine::UpdateRelay) -> anyhow::Result<()> {
    use anyhow::Context;
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigusr1 =
        signal(SignalKind::user_defined1()).context("failed to register SIGUSR1 handler")?;
    let mut sigusr2 =
        signal(SignalKind::user_defined2()).context("failed to register SIGUSR2 handler")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                return Ok(());
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                return Ok(());
            }
            _ = sigusr1.recv() => {
                tracing::info!("received SIGUSR1, host idle");
                relay.relay(Update::Idle { since: Utc::now() });
            }
            _ = sigusr2.recv() => {
                tracing::info!("received SIGUSR2, host active");
                relay.relay(Update::Unidle { since: Utc::now() });
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_relay: &mailpoll_engine::UpdateRelay) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("received ctrl-c, shutting down");
    Ok(())
}
