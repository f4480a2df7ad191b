//! Source and message-builder traits.
//!
//! A source is anything that can stream add/delete events for the messages
//! it stores (an mbox file, a maildir, a remote store...). The engine never
//! sees source wire formats; it only sees [`PollEvent`]s and the
//! [`RawHeader`] a source returns for a reference.

use std::fmt;
use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::types::{Location, Message, MessageId, Person, PollEvent, SourceId, SourceInfo};

/// Receiver for events produced by [`Source::poll`]. Returning
/// `ControlFlow::Break` asks the source to stop producing events.
pub type PollSink<'a> = dyn FnMut(PollEvent) -> ControlFlow<()> + 'a;

/// A mail source. Implementations must be usable from the poll thread while
/// other threads read their flags.
pub trait Source: Send + Sync + fmt::Debug {
    fn id(&self) -> SourceId;

    /// Human-readable location, used in progress and log text.
    fn uri(&self) -> &str;

    /// Persistent fault, if the source is broken.
    fn error(&self) -> Option<SourceError>;

    /// Whether the source is currently faulted.
    ///
    /// Returns `Err` when the state itself cannot be determined (a remote
    /// store that cannot be reached to ask, for instance).
    fn has_errors(&self) -> Result<bool, SourceError> {
        Ok(self.error().is_some())
    }

    /// Every message added from this source is already read.
    fn is_read(&self) -> bool {
        false
    }

    /// Messages added from this source skip the inbox.
    fn is_archived(&self) -> bool {
        false
    }

    /// Included in regular polls. Unusual sources are only polled on demand.
    fn is_usual(&self) -> bool {
        true
    }

    /// Header data for the message stored at `info`.
    fn load_header(&self, info: &SourceInfo) -> Result<RawHeader, SourceError>;

    /// Stream every change since the previous poll into `sink`.
    ///
    /// A source must stop as soon as `sink` returns `Break`, and must not
    /// advance its own position past the event that was refused.
    fn poll(&self, sink: &mut PollSink<'_>) -> Result<(), SourceError>;
}

/// Header fields a source can report for one stored message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeader {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refs: Vec<String>,
    /// Read flag stored with the message by the source (e.g. `Status: RO`).
    #[serde(default)]
    pub read: bool,
}

// ─── Message builder ─────────────────────────────────────────────────

/// Turns raw source info into a candidate [`Message`].
pub trait MessageBuilder: Send + Sync {
    fn build(&self, source: &dyn Source, info: &SourceInfo) -> Result<Message, SourceError>;
}

/// Builds messages from [`Source::load_header`].
///
/// Identity is the Message-ID header with angle brackets stripped; a
/// message without one gets a synthetic id derived from its location.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMessageBuilder;

impl MessageBuilder for HeaderMessageBuilder {
    fn build(&self, source: &dyn Source, info: &SourceInfo) -> Result<Message, SourceError> {
        let header = source.load_header(info)?;

        let id = header
            .message_id
            .as_deref()
            .map(normalize_message_id)
            .filter(|id| !id.is_empty())
            .map(MessageId::new)
            .unwrap_or_else(|| MessageId::synthetic(source.id(), info));

        let mut message = Message::new(id, Location::new(source.id(), info.clone()));
        message.from = header.from.as_deref().map(Person::parse);
        message.subject = header.subject.unwrap_or_default();
        message.date = header.date;
        message.refs = header
            .refs
            .iter()
            .map(|r| MessageId::new(normalize_message_id(r)))
            .collect();
        message.source_marked_read = header.read;
        Ok(message)
    }
}

fn normalize_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}
