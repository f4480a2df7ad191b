//! Periodic poll scheduler.
//!
//! A tokio task wakes every half interval and starts a poll when none has
//! completed yet or the last one finished at least one interval ago. Polls
//! run on the blocking pool: source I/O has no timeout and may stall, and
//! must not stall the runtime with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::PollError;
use crate::manager::PollManager;

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Stopped/running wrapper around the scheduler loop.
pub struct PollScheduler {
    manager: Arc<PollManager>,
    interval: Duration,
    running: Option<Running>,
}

impl PollScheduler {
    pub fn new(manager: Arc<PollManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Start the loop. Must be called from within a tokio runtime.
    /// Returns `false` if the loop is already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.manager),
            self.interval,
            cancel.clone(),
        ));
        info!(interval_secs = self.interval.as_secs_f64(), "poll scheduler started");
        self.running = Some(Running { cancel, handle });
        true
    }

    /// Stop the loop. A poll already in progress runs to completion on
    /// the blocking pool; only the loop ends. Returns `false` if the loop
    /// was not running.
    pub fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                running.cancel.cancel();
                info!("poll scheduler stopped");
                true
            }
            None => false,
        }
    }

    /// Stop the loop and wait for it to exit (not for an in-flight poll).
    pub async fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                error!("poll scheduler task failed: {e}");
            }
            info!("poll scheduler shut down");
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

async fn run_loop(manager: Arc<PollManager>, interval: Duration, cancel: CancellationToken) {
    let nap = interval / 2;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(nap) => {}
        }

        if !manager.poll_due(interval, Utc::now()) {
            continue;
        }

        let poller = Arc::clone(&manager);
        let poll = tokio::task::spawn_blocking(move || poller.poll());
        tokio::select! {
            // Leave the poll running; it finishes on its own.
            () = cancel.cancelled() => break,
            joined = poll => match joined.map_err(PollError::from).and_then(|polled| polled) {
                Ok(Some(counts)) => {
                    debug!(num = counts.num, num_inbox = counts.num_inbox, "scheduled poll done");
                }
                Ok(None) => debug!("scheduled poll skipped: already polling"),
                Err(e) => error!("scheduled poll failed: {e}"),
            },
        }
    }
    debug!("poll scheduler loop exited");
}
