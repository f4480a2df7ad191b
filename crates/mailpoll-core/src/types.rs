use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::{Label, LabelSet};

// ─── Identifiers ─────────────────────────────────────────────────────

/// Numeric handle of a configured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Source-specific reference to one stored message (a byte offset, an IMAP
/// UID, a maildir file name...). Opaque to everything but the source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceInfo(pub String);

impl SourceInfo {
    pub fn new(info: impl Into<String>) -> Self {
        Self(info.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable message identity, used to recognise the same message seen at
/// several locations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity for a message that carries no usable Message-ID header.
    pub fn synthetic(source: SourceId, info: &SourceInfo) -> Self {
        Self(format!("mailpoll-synthetic-{}-{}", source.0, info))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a message was physically found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub source: SourceId,
    pub info: SourceInfo,
}

impl Location {
    pub fn new(source: SourceId, info: SourceInfo) -> Self {
        Self { source, info }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.info)
    }
}

// ─── Person ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: Option<String>,
    pub email: String,
}

impl Person {
    pub fn new(name: Option<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.filter(|n| !n.trim().is_empty()),
            email: email.into(),
        }
    }

    /// Parse `"Name <addr>"` or a bare address.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match (raw.rfind('<'), raw.rfind('>')) {
            (Some(open), Some(close)) if open < close => {
                let name = raw[..open].trim().trim_matches('"').to_string();
                let email = raw[open + 1..close].trim().to_string();
                Self::new(Some(name), email)
            }
            _ => Self::new(None, raw),
        }
    }

    /// `"Name <addr>"` when a name is known, otherwise the address.
    pub fn longname(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} <{}>", self.email),
            None => self.email.clone(),
        }
    }
}

// ─── Message ─────────────────────────────────────────────────────────

/// A message as seen by one poll cycle.
///
/// `locations` is the union of every (source, info) pair the message has
/// been observed at. Durable state belongs to the index; the engine only
/// holds a `Message` for the duration of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub labels: LabelSet,
    pub locations: BTreeSet<Location>,
    pub from: Option<Person>,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    /// Message-IDs this message replies to or references.
    #[serde(default)]
    pub refs: Vec<MessageId>,
    /// The source itself flags the stored copy as already read.
    #[serde(default)]
    pub source_marked_read: bool,
}

impl Message {
    /// A message with a single location and no labels.
    pub fn new(id: MessageId, location: Location) -> Self {
        Self {
            id,
            labels: LabelSet::new(),
            locations: BTreeSet::from([location]),
            from: None,
            subject: String::new(),
            date: None,
            refs: Vec::new(),
            source_marked_read: false,
        }
    }

    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    pub fn is_at(&self, location: &Location) -> bool {
        self.locations.contains(location)
    }

    /// Sender long name, if the sender is known.
    pub fn from_longname(&self) -> Option<String> {
        self.from.as_ref().map(Person::longname)
    }
}

// ─── Poll events ─────────────────────────────────────────────────────

/// One event produced by a source while it is being polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A message appeared at `info`, carrying source-assigned labels.
    Add { info: SourceInfo, labels: LabelSet },
    /// The message stored at `info` is gone.
    Delete { info: SourceInfo },
}

impl PollEvent {
    pub fn info(&self) -> &SourceInfo {
        match self {
            Self::Add { info, .. } | Self::Delete { info } => info,
        }
    }
}
