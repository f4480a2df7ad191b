//! Wiring of the poll pipeline for the binary.

use std::sync::Arc;

use tracing::debug;

use mailpoll_core::{HeaderMessageBuilder, MemoryIndex, MemoryLabelRegistry};
use mailpoll_engine::relay::DEFAULT_RELAY_CAPACITY;
use mailpoll_engine::{
    AfterPoll, HookRegistry, LogStatus, PollManager, Services, SourceManager, UpdateRelay,
};

use crate::config::Config;

pub struct Pipeline {
    pub manager: Arc<PollManager>,
    pub relay: UpdateRelay,
    pub labels: Arc<MemoryLabelRegistry>,
}

/// Build the manager over the configured sources, with an in-process
/// index and label registry.
pub fn build(config: &Config) -> anyhow::Result<Pipeline> {
    let sources = SourceManager::with_sources(config.build_sources()?);
    let relay = UpdateRelay::new(DEFAULT_RELAY_CAPACITY);
    let labels = Arc::new(MemoryLabelRegistry::new());

    let hooks = Arc::new(HookRegistry::new());
    hooks.on_after_poll(log_arrivals);

    let manager = Arc::new(PollManager::new(Services {
        sources: Arc::new(sources),
        index: Arc::new(MemoryIndex::new()),
        labels: labels.clone(),
        builder: Arc::new(HeaderMessageBuilder),
        hooks,
        relay: relay.clone(),
        status: Arc::new(LogStatus),
    }));
    Ok(Pipeline {
        manager,
        relay,
        labels,
    })
}

fn log_arrivals(after: &AfterPoll<'_>) {
    for entry in after.from_and_subj_inbox {
        debug!(
            from = entry.from.as_deref().unwrap_or("(unknown)"),
            subject = %entry.subject,
            "new inbox message"
        );
    }
    if after.num_inbox > 0 {
        debug!(unread = after.num_inbox_total_unread(), "unread inbox messages");
    }
}
