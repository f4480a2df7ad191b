//! In-process collaborators: an index, a label registry and a scripted
//! source, all held in memory.
//!
//! The runtime uses [`MemoryIndex`] and [`MemoryLabelRegistry`] when no
//! external index is configured; [`MemorySource`] replays scripted events
//! and faults.

use std::collections::{HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::{Mutex, RwLock};

use tracing::warn;

use crate::error::{IndexError, SourceError};
use crate::index::{Index, LabelRegistry, MessageFilter};
use crate::labels::{Label, LabelSet};
use crate::source::{PollSink, RawHeader, Source};
use crate::types::{Message, MessageId, PollEvent, SourceId, SourceInfo};

// ─── MemoryIndex ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredRecord {
    message: Message,
    live: bool,
}

/// Hash-map backed [`Index`].
#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<MessageId, StoredRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, live or not.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Some(live)` for a stored record, `None` if `id` is unknown.
    pub fn is_live(&self, id: &MessageId) -> Option<bool> {
        self.records
            .read()
            .ok()
            .and_then(|r| r.get(id).map(|rec| rec.live))
    }
}

impl Index for MemoryIndex {
    fn build_message(&self, id: &MessageId) -> Result<Option<Message>, IndexError> {
        let records = self.records.read().map_err(|_| IndexError::Poisoned)?;
        Ok(records.get(id).map(|rec| rec.message.clone()))
    }

    fn sync_message(&self, message: &Message, live: bool) -> Result<(), IndexError> {
        let mut records = self.records.write().map_err(|_| IndexError::Poisoned)?;
        records.insert(
            message.id.clone(),
            StoredRecord {
                message: message.clone(),
                live,
            },
        );
        Ok(())
    }

    fn each_message(&self, filter: &MessageFilter) -> Result<Vec<Message>, IndexError> {
        let records = self.records.read().map_err(|_| IndexError::Poisoned)?;
        let mut found: Vec<Message> = records
            .values()
            .filter(|rec| filter.matches(&rec.message, rec.live))
            .map(|rec| rec.message.clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    fn num_results_for(&self, filter: &MessageFilter) -> Result<usize, IndexError> {
        let records = self.records.read().map_err(|_| IndexError::Poisoned)?;
        Ok(records
            .values()
            .filter(|rec| filter.matches(&rec.message, rec.live))
            .count())
    }

    fn message_joining_killed(&self, message: &Message) -> Result<bool, IndexError> {
        let records = self.records.read().map_err(|_| IndexError::Poisoned)?;
        Ok(message.refs.iter().any(|r| {
            records
                .get(r)
                .is_some_and(|rec| rec.message.has_label(&Label::KILLED))
        }))
    }
}

// ─── MemoryLabelRegistry ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct RegistryState {
    known: LabelSet,
    /// Labels first seen since start-up.
    new: LabelSet,
}

/// [`LabelRegistry`] that remembers every label and which ones are new.
#[derive(Debug, Default)]
pub struct MemoryLabelRegistry {
    state: RwLock<RegistryState>,
}

impl MemoryLabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that already knows `labels` (e.g. loaded from the index).
    pub fn with_known<I: IntoIterator<Item = Label>>(labels: I) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                known: labels.into_iter().collect(),
                new: LabelSet::new(),
            }),
        }
    }

    pub fn all(&self) -> LabelSet {
        self.state
            .read()
            .map(|s| s.known.clone())
            .unwrap_or_default()
    }

    pub fn new_labels(&self) -> LabelSet {
        self.state.read().map(|s| s.new.clone()).unwrap_or_default()
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.state
            .read()
            .map(|s| s.known.contains(label))
            .unwrap_or(false)
    }
}

impl LabelRegistry for MemoryLabelRegistry {
    fn register(&self, label: &Label) {
        match self.state.write() {
            Ok(mut state) => {
                if state.known.insert(label.clone()) {
                    state.new.insert(label.clone());
                }
            }
            Err(_) => warn!(%label, "label registry lock poisoned; label not recorded"),
        }
    }
}

// ─── MemorySource ────────────────────────────────────────────────────

#[derive(Debug)]
enum Scripted {
    Event(PollEvent),
    /// Mid-stream failure: the source becomes broken and `poll` errors.
    Fail(SourceError),
}

#[derive(Debug, Default)]
struct MemorySourceState {
    headers: HashMap<SourceInfo, RawHeader>,
    pending: VecDeque<Scripted>,
    error: Option<SourceError>,
    /// When set, `has_errors` itself fails.
    status_error: Option<SourceError>,
    polls: usize,
}

/// Source that replays a queue of scripted events.
///
/// Each `poll` drains the queue; events refused by the sink stay queued.
#[derive(Debug)]
pub struct MemorySource {
    id: SourceId,
    uri: String,
    read: bool,
    archived: bool,
    usual: bool,
    state: Mutex<MemorySourceState>,
}

impl MemorySource {
    pub fn new(id: SourceId, uri: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
            read: false,
            archived: false,
            usual: true,
            state: Mutex::new(MemorySourceState::default()),
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read = true;
        self
    }

    #[must_use]
    pub fn archived(mut self) -> Self {
        self.archived = true;
        self
    }

    #[must_use]
    pub fn unusual(mut self) -> Self {
        self.usual = false;
        self
    }

    /// Store a header without queueing an event.
    pub fn store(&self, info: &str, header: RawHeader) {
        self.with_state(|s| {
            s.headers.insert(SourceInfo::new(info), header);
        });
    }

    /// Store a header and queue an add for it.
    pub fn push_add<I, L>(&self, info: &str, header: RawHeader, labels: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        let info = SourceInfo::new(info);
        let labels = labels.into_iter().map(Into::into).collect();
        self.with_state(|s| {
            s.headers.insert(info.clone(), header);
            s.pending
                .push_back(Scripted::Event(PollEvent::Add { info, labels }));
        });
    }

    pub fn push_delete(&self, info: &str) {
        self.with_state(|s| {
            s.pending.push_back(Scripted::Event(PollEvent::Delete {
                info: SourceInfo::new(info),
            }));
        });
    }

    /// Queue a mid-stream failure.
    pub fn push_failure(&self, error: SourceError) {
        self.with_state(|s| s.pending.push_back(Scripted::Fail(error)));
    }

    pub fn set_error(&self, error: Option<SourceError>) {
        self.with_state(|s| s.error = error);
    }

    /// Make `has_errors` itself fail.
    pub fn fail_status_check(&self, error: SourceError) {
        self.with_state(|s| s.status_error = Some(error));
    }

    /// Number of times `poll` was entered.
    pub fn poll_count(&self) -> usize {
        self.with_state(|s| s.polls)
    }

    pub fn pending(&self) -> usize {
        self.with_state(|s| s.pending.len())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemorySourceState) -> T) -> T {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

impl Source for MemorySource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn error(&self) -> Option<SourceError> {
        self.with_state(|s| s.error.clone())
    }

    fn has_errors(&self) -> Result<bool, SourceError> {
        self.with_state(|s| match &s.status_error {
            Some(e) => Err(e.clone()),
            None => Ok(s.error.is_some()),
        })
    }

    fn is_read(&self) -> bool {
        self.read
    }

    fn is_archived(&self) -> bool {
        self.archived
    }

    fn is_usual(&self) -> bool {
        self.usual
    }

    fn load_header(&self, info: &SourceInfo) -> Result<RawHeader, SourceError> {
        self.with_state(|s| s.headers.get(info).cloned())
            .ok_or_else(|| SourceError::UnknownInfo(info.clone()))
    }

    fn poll(&self, sink: &mut PollSink<'_>) -> Result<(), SourceError> {
        self.with_state(|s| s.polls += 1);
        // The state lock is never held across `sink`: the engine calls back
        // into `load_header` and `error` while handling an event.
        loop {
            let Some(next) = self.with_state(|s| s.pending.pop_front()) else {
                return Ok(());
            };
            match next {
                Scripted::Fail(error) => {
                    self.with_state(|s| s.error = Some(error.clone()));
                    return Err(error);
                }
                Scripted::Event(event) => {
                    if sink(event.clone()).is_break() {
                        self.with_state(|s| s.pending.push_front(Scripted::Event(event)));
                        return Ok(());
                    }
                }
            }
        }
    }
}
