//! Labels and the set rules the poll engine applies to them.
//!
//! Three rules live here rather than inline in the engine so that each one
//! is a named set operation:
//!
//! - [`merge_labels`]: how a re-sighted message's labels combine with the
//!   labels already on record.
//! - [`counts_toward_inbox`]: whether an added message is reported as an
//!   inbox arrival.
//! - [`reportable_labels`]: which newly-seen labels are worth surfacing.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Label ───────────────────────────────────────────────────────────

/// A single message label. Labels compare by name.
///
/// Deserialized names go through [`Label::new`], so a label read from disk
/// compares equal to the same label built in code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Label(Cow<'static, str>);

/// Unordered, duplicate-free label collection (ordered for stable output).
pub type LabelSet = BTreeSet<Label>;

impl Label {
    pub const INBOX: Label = Label::reserved("inbox");
    pub const UNREAD: Label = Label::reserved("unread");
    pub const STARRED: Label = Label::reserved("starred");
    pub const SPAM: Label = Label::reserved("spam");
    pub const DRAFT: Label = Label::reserved("draft");
    pub const KILLED: Label = Label::reserved("killed");
    pub const SENT: Label = Label::reserved("sent");
    pub const DELETED: Label = Label::reserved("deleted");
    pub const ATTACHMENT: Label = Label::reserved("attachment");

    const fn reserved(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Build a user label. Names are trimmed and lowercased.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Cow::Owned(name.as_ref().trim().to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this label belongs to the fixed reserved set.
    pub fn is_reserved(&self) -> bool {
        RESERVED_LABELS.contains(self)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Label {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0.into_owned()
    }
}

// ─── Reserved sets ───────────────────────────────────────────────────

/// Labels with built-in meaning. Users cannot create or rename these.
pub const RESERVED_LABELS: [Label; 9] = [
    Label::STARRED,
    Label::SPAM,
    Label::DRAFT,
    Label::UNREAD,
    Label::KILLED,
    Label::SENT,
    Label::DELETED,
    Label::INBOX,
    Label::ATTACHMENT,
];

/// Reserved labels that are never shown in label listings.
pub const HIDDEN_RESERVED_LABELS: [Label; 3] = [Label::STARRED, Label::UNREAD, Label::ATTACHMENT];

/// Labels a later sighting of a known message may not re-apply.
const SIGHTING_ONLY_LABELS: [Label; 2] = [Label::UNREAD, Label::INBOX];

/// Labels whose presence stops a message from counting as an inbox arrival.
const INBOX_SUPPRESSING_LABELS: [Label; 3] = [Label::SPAM, Label::DELETED, Label::KILLED];

/// Build a [`LabelSet`] from anything label-like.
pub fn label_set<I, L>(labels: I) -> LabelSet
where
    I: IntoIterator<Item = L>,
    L: Into<Label>,
{
    labels.into_iter().map(Into::into).collect()
}

// ─── Set rules ───────────────────────────────────────────────────────

/// Merge the labels of a re-sighted message into the labels on record.
///
/// `existing ∪ (sighted − {unread, inbox})`
///
/// A message already in the index keeps whatever read/archive state the
/// user gave it: seeing it again at another location must not put it back
/// into the inbox or mark it unread. Every other label is a monotonic
/// union, so repeated sightings never drop a label.
pub fn merge_labels(existing: &LabelSet, sighted: &LabelSet) -> LabelSet {
    let mut merged = existing.clone();
    merged.extend(
        sighted
            .iter()
            .filter(|l| !SIGHTING_ONLY_LABELS.contains(l))
            .cloned(),
    );
    merged
}

/// Whether a newly added message counts as an inbox arrival.
///
/// True iff `labels ∩ {inbox, spam, deleted, killed} == {inbox}`.
pub fn counts_toward_inbox(labels: &LabelSet) -> bool {
    labels.contains(&Label::INBOX)
        && !INBOX_SUPPRESSING_LABELS
            .iter()
            .any(|l| labels.contains(l))
}

/// Strip labels that are not worth reporting as "newly seen":
/// the hidden reserved set plus `inbox` and `killed`.
pub fn reportable_labels(loaded: &LabelSet) -> LabelSet {
    loaded
        .iter()
        .filter(|l| {
            !HIDDEN_RESERVED_LABELS.contains(l) && **l != Label::INBOX && **l != Label::KILLED
        })
        .cloned()
        .collect()
}
