//! Index and label-registry traits.

use crate::error::IndexError;
use crate::labels::{Label, LabelSet};
use crate::types::{Location, Message, MessageId};

/// Selects index records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Records must carry every one of these labels.
    pub labels: LabelSet,
    /// Records must be located here.
    pub location: Option<Location>,
    /// Include records persisted as not live.
    pub include_removed: bool,
}

impl MessageFilter {
    pub fn labels<I: IntoIterator<Item = Label>>(labels: I) -> Self {
        Self {
            labels: labels.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn at(location: Location) -> Self {
        Self {
            location: Some(location),
            include_removed: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, message: &Message, live: bool) -> bool {
        (live || self.include_removed)
            && self.labels.is_subset(&message.labels)
            && self
                .location
                .as_ref()
                .is_none_or(|loc| message.is_at(loc))
    }
}

/// The persistent, searchable message index.
///
/// Writes issued by the poll engine are serialized by the poll sweep;
/// implementations only need to be safe for concurrent readers.
pub trait Index: Send + Sync {
    /// The record stored under `id`, if any.
    fn build_message(&self, id: &MessageId) -> Result<Option<Message>, IndexError>;

    /// Insert or replace the record for `message.id`. `live` is false when
    /// the message has just been removed from one of its locations.
    fn sync_message(&self, message: &Message, live: bool) -> Result<(), IndexError>;

    fn each_message(&self, filter: &MessageFilter) -> Result<Vec<Message>, IndexError>;

    fn num_results_for(&self, filter: &MessageFilter) -> Result<usize, IndexError>;

    /// Whether `message` belongs to a thread the user has killed.
    fn message_joining_killed(&self, _message: &Message) -> Result<bool, IndexError> {
        Ok(false)
    }
}

/// Tracks the labels in use. Registration is idempotent.
pub trait LabelRegistry: Send + Sync {
    fn register(&self, label: &Label);
}
