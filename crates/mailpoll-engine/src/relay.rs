//! Update relay: broadcasts index changes and idle-state transitions to
//! whoever is listening.
//!
//! Broadcast receivers that fall behind lose the oldest updates. Idle state
//! is therefore also published on a `watch` channel, which never drops a
//! transition's effect: [`IdleState::wakeups`] counts every return from
//! idle, so a reader that only sees the latest value still knows a reset
//! happened in between.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::trace;

use mailpoll_core::{Location, Message};

/// Default channel capacity; slow receivers see `Lagged` beyond this.
pub const DEFAULT_RELAY_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// A message was written to the index as live.
    Added(Message),
    /// A message lost one of its locations.
    Deleted { message: Message, location: Location },
    /// The host application went idle.
    Idle { since: DateTime<Utc> },
    /// The host application is interactive again.
    Unidle { since: DateTime<Utc> },
}

impl Update {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Deleted { .. } => "deleted",
            Self::Idle { .. } => "idle",
            Self::Unidle { .. } => "unidle",
        }
    }
}

/// Latest host activity state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleState {
    pub idle: bool,
    /// Number of idle → interactive transitions so far.
    pub wakeups: u64,
}

/// Cloneable handle on the broadcast channel.
#[derive(Debug, Clone)]
pub struct UpdateRelay {
    tx: broadcast::Sender<Update>,
    idle: Arc<watch::Sender<IdleState>>,
}

impl UpdateRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        let (idle, _idle_rx) = watch::channel(IdleState::default());
        Self {
            tx,
            idle: Arc::new(idle),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.tx.subscribe()
    }

    /// Follow idle state without ever missing a reset.
    pub fn watch_idle(&self) -> watch::Receiver<IdleState> {
        self.idle.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast `update`. Having no listeners is not an error.
    /// Idle transitions also update the idle watch.
    pub fn relay(&self, update: Update) {
        match update {
            Update::Idle { .. } => self.idle.send_modify(|s| s.idle = true),
            Update::Unidle { .. } => self.idle.send_modify(|s| {
                s.idle = false;
                s.wakeups += 1;
            }),
            Update::Added(_) | Update::Deleted { .. } => {}
        }
        let kind = update.kind();
        match self.tx.send(update) {
            Ok(receivers) => trace!(kind, receivers, "update relayed"),
            Err(_) => trace!(kind, "update dropped: no listeners"),
        }
    }
}

impl Default for UpdateRelay {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_CAPACITY)
    }
}
