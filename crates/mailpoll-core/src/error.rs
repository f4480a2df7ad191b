//! Error types shared by sources, the index, and the poll engine.

use thiserror::Error;

use crate::types::SourceInfo;

/// Errors reported by a mail source.
///
/// `Clone` so a source can keep its persistent fault and hand out copies
/// through [`crate::Source::error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source is in a persistent error state and must be repaired
    /// before it can be polled again.
    #[error("source is broken: {0}")]
    Broken(String),

    /// The source could not be reached for this attempt.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source holds no message at the given reference.
    #[error("no message at {0}")]
    UnknownInfo(SourceInfo),

    #[error("malformed record at line {line}: {detail}")]
    Malformed { line: u64, detail: String },

    #[error("source io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Errors reported by the message index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("index lock poisoned")]
    Poisoned,

    #[error("index write rejected for {id}: {reason}")]
    Rejected { id: String, reason: String },
}
