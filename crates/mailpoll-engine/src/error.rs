//! Errors that abort a poll sweep.
//!
//! Source failures never show up here: they are contained per source,
//! logged, and surfaced through the broken-source report.

use thiserror::Error;

use mailpoll_core::IndexError;

#[derive(Debug, Error)]
pub enum PollError {
    /// The index refused a read or write while processing an event. The
    /// sweep stops at that event; no later source is polled.
    #[error("index error during poll: {0}")]
    Index(#[from] IndexError),

    /// The poll ran on a worker that panicked or was cancelled.
    #[error("poll task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PollError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
