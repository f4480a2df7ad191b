//! Poll-from engine: drives one source's event stream and reconciles every
//! event against the index.
//!
//! For an add:
//! 1. build a candidate message from the source reference,
//! 2. look up any record with the same identity,
//! 3. apply the event's labels, then the source's archive/read rules,
//! 4. register every label,
//! 5. merge with the existing record (see [`merge_labels`]),
//! 6. run `before-add-message`,
//! 7. hand the action to the caller,
//! 8. write the record as live and relay `Added`.
//!
//! For a delete, every record located at (source, info) loses that
//! location, is handed to the caller, written as not live, and relayed
//! as `Deleted`.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, warn};

use mailpoll_core::labels::merge_labels;
use mailpoll_core::{
    Index, IndexError, Label, LabelRegistry, LabelSet, Location, Message, MessageBuilder,
    MessageFilter, PollEvent, Source, SourceError, SourceInfo,
};

use crate::error::PollError;
use crate::hooks::HookRegistry;
use crate::relay::{Update, UpdateRelay};
use crate::status::StatusSurface;

/// What the engine did with one event, as seen by the caller.
#[derive(Debug, Clone, Copy)]
pub enum PollAction<'a> {
    /// `message` is the fully merged record about to be written;
    /// `existing` is what the index held before, if anything.
    Add {
        message: &'a Message,
        existing: Option<&'a Message>,
    },
    /// `message` no longer lists `location`.
    Delete {
        message: &'a Message,
        location: &'a Location,
    },
}

/// Why handling one event stopped the stream.
enum EventError {
    Source(SourceError),
    Index(IndexError),
}

impl From<IndexError> for EventError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}

/// Everything a source's events touch, bundled for one sweep.
pub struct PollEngine {
    index: Arc<dyn Index>,
    labels: Arc<dyn LabelRegistry>,
    builder: Arc<dyn MessageBuilder>,
    hooks: Arc<HookRegistry>,
    relay: UpdateRelay,
    status: Arc<dyn StatusSurface>,
}

impl PollEngine {
    pub fn new(
        index: Arc<dyn Index>,
        labels: Arc<dyn LabelRegistry>,
        builder: Arc<dyn MessageBuilder>,
        hooks: Arc<HookRegistry>,
        relay: UpdateRelay,
        status: Arc<dyn StatusSurface>,
    ) -> Self {
        Self {
            index,
            labels,
            builder,
            hooks,
            relay,
            status,
        }
    }

    pub fn index(&self) -> &Arc<dyn Index> {
        &self.index
    }

    /// Drive `source` and report each reconciled event to `on_action`.
    ///
    /// A source that is already faulted yields nothing. Source failures
    /// (at setup, mid-stream, or while building a message) stop this
    /// source only: they are logged, reported as broken, and `Ok` is
    /// returned. Index failures abort with `Err`.
    pub fn poll_from<F>(&self, source: &dyn Source, mut on_action: F) -> Result<(), PollError>
    where
        F: FnMut(PollAction<'_>),
    {
        match source.has_errors() {
            Ok(false) => {}
            Ok(true) => {
                debug!(uri = source.uri(), "source has errors; skipping");
                return Ok(());
            }
            Err(e) => {
                self.source_failed(source, &e);
                return Ok(());
            }
        }

        let mut failure: Option<SourceError> = None;
        let mut aborted: Option<IndexError> = None;
        let mut events = 0usize;

        let streamed = source.poll(&mut |event| {
            if let Some(fault) = source.error() {
                failure = Some(fault);
                return ControlFlow::Break(());
            }
            events += 1;
            let handled = match event {
                PollEvent::Add { info, labels } => {
                    self.handle_add(source, info, labels, &mut on_action)
                }
                PollEvent::Delete { info } => self.handle_delete(source, info, &mut on_action),
            };
            match handled {
                Ok(()) => ControlFlow::Continue(()),
                Err(EventError::Source(e)) => {
                    failure = Some(e);
                    ControlFlow::Break(())
                }
                Err(EventError::Index(e)) => {
                    aborted = Some(e);
                    ControlFlow::Break(())
                }
            }
        });

        if let Some(e) = aborted {
            return Err(e.into());
        }
        if let Some(e) = streamed.err().or(failure) {
            self.source_failed(source, &e);
            return Ok(());
        }
        debug!(uri = source.uri(), events, "source drained");
        Ok(())
    }

    fn source_failed(&self, source: &dyn Source, error: &SourceError) {
        warn!(uri = source.uri(), error = %error, "problem getting messages from source");
        self.status.report_broken_sources(false);
    }

    fn handle_add<F>(
        &self,
        source: &dyn Source,
        info: SourceInfo,
        labels: LabelSet,
        on_action: &mut F,
    ) -> Result<(), EventError>
    where
        F: FnMut(PollAction<'_>),
    {
        let mut message = self
            .builder
            .build(source, &info)
            .map_err(EventError::Source)?;
        let existing = self.index.build_message(&message.id)?;

        message.labels.extend(labels);
        if source.is_archived() {
            message.labels.remove(&Label::INBOX);
        }
        if source.is_read() || message.source_marked_read {
            message.labels.remove(&Label::UNREAD);
        }
        if self.index.message_joining_killed(&message)? {
            message.labels.insert(Label::KILLED);
        }

        for label in &message.labels {
            self.labels.register(label);
        }

        if let Some(old) = &existing {
            message.labels = merge_labels(&old.labels, &message.labels);
            message.locations.extend(old.locations.iter().cloned());
        }

        debug!(
            id = %message.id,
            %info,
            known = existing.is_some(),
            labels = message.labels.len(),
            "adding message"
        );

        self.hooks.run_before_add_message(&message);
        on_action(PollAction::Add {
            message: &message,
            existing: existing.as_ref(),
        });
        self.index.sync_message(&message, true)?;
        self.relay.relay(Update::Added(message));
        Ok(())
    }

    fn handle_delete<F>(
        &self,
        source: &dyn Source,
        info: SourceInfo,
        on_action: &mut F,
    ) -> Result<(), EventError>
    where
        F: FnMut(PollAction<'_>),
    {
        let location = Location::new(source.id(), info);
        for mut message in self.index.each_message(&MessageFilter::at(location.clone()))? {
            message.locations.remove(&location);
            debug!(
                id = %message.id,
                %location,
                remaining = message.locations.len(),
                "removing location"
            );
            on_action(PollAction::Delete {
                message: &message,
                location: &location,
            });
            self.index.sync_message(&message, false)?;
            self.relay.relay(Update::Deleted {
                message,
                location: location.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use mailpoll_core::labels::label_set;
    use mailpoll_core::{
        HeaderMessageBuilder, MemoryIndex, MemoryLabelRegistry, MemorySource, MessageId,
        RawHeader, SourceId,
    };

    use super::*;
    use crate::status::RecordingStatus;

    struct Fixture {
        index: Arc<MemoryIndex>,
        labels: Arc<MemoryLabelRegistry>,
        hooks: Arc<HookRegistry>,
        relay: UpdateRelay,
        status: Arc<RecordingStatus>,
        engine: PollEngine,
    }

    fn fixture() -> Fixture {
        let index = Arc::new(MemoryIndex::new());
        let labels = Arc::new(MemoryLabelRegistry::new());
        let hooks = Arc::new(HookRegistry::new());
        let relay = UpdateRelay::new(64);
        let status = Arc::new(RecordingStatus::new());
        let engine = PollEngine::new(
            index.clone(),
            labels.clone(),
            Arc::new(HeaderMessageBuilder),
            hooks.clone(),
            relay.clone(),
            status.clone(),
        );
        Fixture {
            index,
            labels,
            hooks,
            relay,
            status,
            engine,
        }
    }

    fn header(id: &str) -> RawHeader {
        RawHeader {
            message_id: Some(format!("<{id}>")),
            from: Some("Ada <ada@example.org>".into()),
            subject: Some(format!("about {id}")),
            ..RawHeader::default()
        }
    }

    fn loc(source: u64, info: &str) -> Location {
        Location::new(SourceId(source), SourceInfo::new(info))
    }

    /// Drive `source` and collect (kind, id, had_existing) per action.
    fn drive(fx: &Fixture, source: &dyn Source) -> Vec<(&'static str, String, bool)> {
        let mut seen = Vec::new();
        fx.engine
            .poll_from(source, |action| match action {
                PollAction::Add { message, existing } => {
                    seen.push(("add", message.id.to_string(), existing.is_some()))
                }
                PollAction::Delete { message, .. } => {
                    seen.push(("delete", message.id.to_string(), true))
                }
            })
            .expect("poll_from");
        seen
    }

    #[test]
    fn new_message_keeps_source_labels_and_single_location() {
        let fx = fixture();
        let source = MemorySource::new(SourceId(1), "mem:a");
        source.push_add("10", header("m1"), ["inbox", "unread", "work"]);

        assert_eq!(drive(&fx, &source), vec![("add", "m1".to_string(), false)]);

        let stored = fx
            .index
            .build_message(&MessageId::new("m1"))
            .expect("build")
            .expect("stored");
        assert_eq!(stored.labels, label_set(["inbox", "unread", "work"]));
        assert_eq!(stored.locations, BTreeSet::from([loc(1, "10")]));
        assert_eq!(fx.index.is_live(&stored.id), Some(true));
        assert_eq!(fx.labels.all(), label_set(["inbox", "unread", "work"]));
    }

    #[test]
    fn read_only_source_drops_unread() {
        let fx = fixture();
        let source = MemorySource::new(SourceId(1), "mem:a").read_only();
        source.push_add("10", header("m1"), ["inbox", "unread"]);
        drive(&fx, &source);

        let stored = fx
            .index
            .build_message(&MessageId::new("m1"))
            .expect("build")
            .expect("stored");
        assert_eq!(stored.labels, label_set(["inbox"]));
    }

    #[test]
    fn source_marked_read_drops_unread() {
        let fx = fixture();
        let source = MemorySource::new(SourceId(1), "mem:a");
        let mut h = header("m1");
        h.read = true;
        source.push_add("10", h, ["inbox", "unread"]);
        drive(&fx, &source);

        let stored = fx
            .index
            .build_message(&MessageId::new("m1"))
            .expect("build")
            .expect("stored");
        assert_eq!(stored.labels, label_set(["inbox"]));
    }

    #[test]
    fn archived_source_skips_inbox() {
        let fx = fixture();
        let source = MemorySource::new(SourceId(1), "mem:a").archived();
        source.push_add("10", header("m1"), ["inbox", "unread"]);
        drive(&fx, &source);

        let stored = fx
            .index
            .build_message(&MessageId::new("m1"))
            .expect("build")
            .expect("stored");
        assert_eq!(stored.labels, label_set(["unread"]));
    }

    #[test]
    fn resighting_merges_labels_and_locations_without_repromoting() {
        let fx = fixture();
        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_add("10", header("m1"), ["work"]);
        drive(&fx, &a);

        let b = MemorySource::new(SourceId(2), "mem:b");
        b.push_add("77", header("m1"), ["inbox", "unread", "list"]);
        assert_eq!(drive(&fx, &b), vec![("add", "m1".to_string(), true)]);

        let stored = fx
            .index
            .build_message(&MessageId::new("m1"))
            .expect("build")
            .expect("stored");
        assert_eq!(stored.labels, label_set(["work", "list"]));
        assert_eq!(stored.locations, BTreeSet::from([loc(1, "10"), loc(2, "77")]));
        // Newly sighted labels are still registered.
        assert!(fx.labels.contains(&Label::new("list")));
    }

    #[test]
    fn joining_killed_thread_adds_killed() {
        let fx = fixture();
        let source = MemorySource::new(SourceId(1), "mem:a");
        source.push_add("1", header("parent"), ["inbox"]);
        drive(&fx, &source);
        let mut parent = fx
            .index
            .build_message(&MessageId::new("parent"))
            .expect("build")
            .expect("stored");
        parent.labels.insert(Label::KILLED);
        fx.index.sync_message(&parent, true).expect("sync");

        let mut h = header("reply");
        h.refs = vec!["<parent>".into()];
        source.push_add("2", h, ["inbox"]);
        drive(&fx, &source);

        let reply = fx
            .index
            .build_message(&MessageId::new("reply"))
            .expect("build")
            .expect("stored");
        assert_eq!(reply.labels, label_set(["inbox", "killed"]));
    }

    #[test]
    fn before_add_hook_sees_merged_message() {
        let fx = fixture();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        fx.hooks.on_before_add_message(move |m| {
            seen2
                .lock()
                .expect("lock")
                .push((m.labels.clone(), m.locations.len()));
        });

        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_add("10", header("m1"), ["inbox"]);
        drive(&fx, &a);
        let b = MemorySource::new(SourceId(2), "mem:b");
        b.push_add("20", header("m1"), ["starred"]);
        drive(&fx, &b);

        let seen = seen.lock().expect("lock");
        assert_eq!(seen[1], (label_set(["inbox", "starred"]), 2));
    }

    #[test]
    fn delete_removes_location_and_relays() {
        let fx = fixture();
        let mut updates = fx.relay.subscribe();
        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_add("10", header("m1"), ["inbox"]);
        drive(&fx, &a);
        let b = MemorySource::new(SourceId(2), "mem:b");
        b.push_add("20", header("m1"), Vec::<&str>::new());
        drive(&fx, &b);

        a.push_delete("10");
        assert_eq!(drive(&fx, &a), vec![("delete", "m1".to_string(), true)]);

        let stored = fx
            .index
            .build_message(&MessageId::new("m1"))
            .expect("build")
            .expect("still index-owned");
        assert_eq!(stored.locations, BTreeSet::from([loc(2, "20")]));
        assert_eq!(fx.index.is_live(&stored.id), Some(false));

        let kinds: Vec<_> = std::iter::from_fn(|| updates.try_recv().ok())
            .map(|u| u.kind())
            .collect();
        assert_eq!(kinds, ["added", "added", "deleted"]);
    }

    #[test]
    fn delete_of_unknown_location_is_a_no_op() {
        let fx = fixture();
        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_delete("999");
        assert!(drive(&fx, &a).is_empty());
        assert!(fx.index.is_empty());
    }

    #[test]
    fn faulted_source_yields_nothing() {
        let fx = fixture();
        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_add("10", header("m1"), ["inbox"]);
        a.set_error(Some(SourceError::Broken("bad offset".into())));

        assert!(drive(&fx, &a).is_empty());
        assert_eq!(a.poll_count(), 0);
        assert!(fx.status.snapshot().broken_reports.is_empty());
    }

    #[test]
    fn status_check_failure_is_contained() {
        let fx = fixture();
        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_add("10", header("m1"), ["inbox"]);
        a.fail_status_check(SourceError::Unavailable("connection refused".into()));

        assert!(drive(&fx, &a).is_empty());
        assert_eq!(fx.status.snapshot().broken_reports, vec![false]);
    }

    #[test]
    fn mid_stream_failure_stops_source_without_error() {
        let fx = fixture();
        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_add("1", header("m1"), ["inbox"]);
        a.push_failure(SourceError::Broken("truncated".into()));
        a.push_add("2", header("m2"), ["inbox"]);

        assert_eq!(drive(&fx, &a), vec![("add", "m1".to_string(), false)]);
        assert_eq!(fx.index.len(), 1);
        assert_eq!(fx.status.snapshot().broken_reports, vec![false]);
    }

    #[test]
    fn unbuildable_message_stops_source() {
        let fx = fixture();
        let inner = MemorySource::new(SourceId(3), "mem:c");
        inner.push_add("1", header("c1"), ["inbox"]);
        inner.push_add("2", header("c2"), ["inbox"]);
        let ghost = GhostSource(inner);

        assert!(drive(&fx, &ghost).is_empty());
        assert!(fx.index.is_empty());
        assert_eq!(fx.status.snapshot().broken_reports, vec![false]);
        // The refused event stays with the source for the next poll.
        assert_eq!(ghost.0.pending(), 2);
    }

    /// Streams the wrapped source's events but can load no headers.
    #[derive(Debug)]
    struct GhostSource(MemorySource);

    impl Source for GhostSource {
        fn id(&self) -> SourceId {
            self.0.id()
        }
        fn uri(&self) -> &str {
            "mem:ghost"
        }
        fn error(&self) -> Option<SourceError> {
            None
        }
        fn load_header(&self, info: &SourceInfo) -> Result<RawHeader, SourceError> {
            Err(SourceError::UnknownInfo(info.clone()))
        }
        fn poll(&self, sink: &mut mailpoll_core::PollSink<'_>) -> Result<(), SourceError> {
            self.0.poll(sink)
        }
    }

    /// Index whose writes always fail.
    struct ReadOnlyIndex(MemoryIndex);

    impl Index for ReadOnlyIndex {
        fn build_message(&self, id: &MessageId) -> Result<Option<Message>, IndexError> {
            self.0.build_message(id)
        }
        fn sync_message(&self, message: &Message, _live: bool) -> Result<(), IndexError> {
            Err(IndexError::Rejected {
                id: message.id.to_string(),
                reason: "read-only".into(),
            })
        }
        fn each_message(&self, filter: &MessageFilter) -> Result<Vec<Message>, IndexError> {
            self.0.each_message(filter)
        }
        fn num_results_for(&self, filter: &MessageFilter) -> Result<usize, IndexError> {
            self.0.num_results_for(filter)
        }
    }

    #[test]
    fn index_failure_aborts_and_leaves_event_queued() {
        let engine = PollEngine::new(
            Arc::new(ReadOnlyIndex(MemoryIndex::new())),
            Arc::new(MemoryLabelRegistry::new()),
            Arc::new(HeaderMessageBuilder),
            Arc::new(HookRegistry::new()),
            UpdateRelay::new(8),
            Arc::new(RecordingStatus::new()),
        );
        let a = MemorySource::new(SourceId(1), "mem:a");
        a.push_add("1", header("m1"), ["inbox"]);
        a.push_add("2", header("m2"), ["inbox"]);

        let err = engine
            .poll_from(&a, |_| {})
            .expect_err("index write fails");
        assert!(matches!(err, PollError::Index(IndexError::Rejected { .. })));
        assert_eq!(a.pending(), 2);
    }
}
