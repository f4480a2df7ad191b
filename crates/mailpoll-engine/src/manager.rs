//! Poll manager: the single-flight orchestrator over a set of sources.
//!
//! Two layers of exclusion:
//!
//! - an atomic in-flight flag at [`PollManager::poll`] /
//!   [`PollManager::poll_unusual`], so a second caller returns at once
//!   instead of queueing behind a running poll;
//! - a mutex around the whole source sweep in [`PollManager::do_poll`],
//!   so direct sweeps never interleave their index writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mailpoll_core::{Index, Label, LabelRegistry, MessageBuilder, MessageFilter, Source};

use crate::error::PollError;
use crate::hooks::{AfterPoll, HookRegistry};
use crate::outcome::{PollCounts, PollOutcome};
use crate::poll_from::{PollAction, PollEngine};
use crate::relay::{IdleState, UpdateRelay};
use crate::sources::SourceManager;
use crate::status::StatusSurface;
use crate::totals::TotalsAccumulator;

/// Collaborators a [`PollManager`] is built from.
pub struct Services {
    pub sources: Arc<SourceManager>,
    pub index: Arc<dyn Index>,
    pub labels: Arc<dyn LabelRegistry>,
    pub builder: Arc<dyn MessageBuilder>,
    pub hooks: Arc<HookRegistry>,
    pub relay: UpdateRelay,
    pub status: Arc<dyn StatusSurface>,
}

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PollManager {
    sources: Arc<SourceManager>,
    engine: PollEngine,
    hooks: Arc<HookRegistry>,
    status: Arc<dyn StatusSurface>,
    polling: AtomicBool,
    sweep: Mutex<()>,
    last_poll: Mutex<Option<DateTime<Utc>>>,
    totals: Mutex<TotalsAccumulator>,
}

impl PollManager {
    pub fn new(services: Services) -> Self {
        let Services {
            sources,
            index,
            labels,
            builder,
            hooks,
            relay,
            status,
        } = services;
        Self {
            sources,
            engine: PollEngine::new(
                index,
                labels,
                builder,
                Arc::clone(&hooks),
                relay,
                Arc::clone(&status),
            ),
            hooks,
            status,
            polling: AtomicBool::new(false),
            sweep: Mutex::new(()),
            last_poll: Mutex::new(None),
            totals: Mutex::new(TotalsAccumulator::new()),
        }
    }

    pub fn sources(&self) -> &Arc<SourceManager> {
        &self.sources
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    /// When the last sweep completed, if any has.
    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_poll)
    }

    /// Whether a scheduled poll should run now: never polled, or at least
    /// `interval` since the last completed sweep.
    pub fn poll_due(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        match self.last_poll() {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= interval),
        }
    }

    /// Poll the usual sources. Returns `Ok(None)` without touching any
    /// source if a poll is already in flight.
    pub fn poll(&self) -> Result<Option<PollCounts>, PollError> {
        self.poll_selected("usual", SourceManager::usual_sources)
    }

    /// Poll the sources excluded from regular polls.
    pub fn poll_unusual(&self) -> Result<Option<PollCounts>, PollError> {
        self.poll_selected("unusual", SourceManager::unusual_sources)
    }

    fn poll_selected(
        &self,
        kind: &str,
        select: fn(&SourceManager) -> Vec<Arc<dyn Source>>,
    ) -> Result<Option<PollCounts>, PollError> {
        let Some(_in_flight) = InFlight::acquire(&self.polling) else {
            debug!(kind, "already polling");
            return Ok(None);
        };
        let sources = select(&self.sources);
        debug!(kind, sources = sources.len(), "poll starting");
        let outcome = self.poll_with_sources(&sources)?;
        Ok(Some(outcome.counts()))
    }

    /// One full poll over `sources`: hooks, sweep, running totals, flash.
    pub fn poll_with_sources(&self, sources: &[Arc<dyn Source>]) -> Result<PollOutcome, PollError> {
        self.hooks.run_before_poll();
        self.status.flash("Polling for new messages...");

        let outcome = self.do_poll(sources)?;

        let totals = lock(&self.totals).record(&outcome);
        self.status.flash(&totals.flash_text());

        let index = self.engine.index();
        let unread_inbox = || {
            index
                .num_results_for(&MessageFilter::labels([Label::INBOX, Label::UNREAD]))
                .unwrap_or_else(|e| {
                    warn!(error = %e, "counting unread inbox messages failed");
                    0
                })
        };
        self.hooks.run_after_poll(&AfterPoll::new(
            outcome.num,
            outcome.num_inbox,
            &outcome.from_and_subj,
            &outcome.from_and_subj_inbox,
            &unread_inbox,
        ));
        Ok(outcome)
    }

    /// Sweep `sources` in order under the sweep lock.
    ///
    /// A source that is faulted is still handed to the engine (which skips
    /// it) but gets no progress text. A source whose fault state cannot be
    /// read is reported as broken and skipped. An index failure stops the
    /// sweep and is returned.
    pub fn do_poll(&self, sources: &[Arc<dyn Source>]) -> Result<PollOutcome, PollError> {
        let _sweep = lock(&self.sweep);
        let mut total = PollOutcome::default();

        for source in sources {
            match source.has_errors() {
                Ok(false) => self.status.say(&format!("Loading from {}... ", source.uri())),
                Ok(true) => {}
                Err(e) => {
                    warn!(uri = source.uri(), error = %e, "problem getting messages from source");
                    self.status.report_broken_sources(true);
                    continue;
                }
            }

            let mut tally = PollOutcome::default();
            self.engine
                .poll_from(source.as_ref(), |action| match action {
                    PollAction::Delete { message, .. } => {
                        self.status.say(&format!("Deleting {}", message.id));
                    }
                    PollAction::Add {
                        message,
                        existing: Some(old),
                    } => match message.locations.difference(&old.locations).next() {
                        Some(location) => self.status.say(&format!(
                            "Message at {} is an update of an old message. \
                             Updating labels from {} => {}",
                            location.info,
                            join_labels(&old.labels),
                            join_labels(&message.labels),
                        )),
                        None => self
                            .status
                            .say(&format!("Skipping already-imported message {}", message.id)),
                    },
                    PollAction::Add {
                        message,
                        existing: None,
                    } => {
                        self.status.say(&format!(
                            "Found new message {} with labels {}",
                            message.id,
                            join_labels(&message.labels)
                        ));
                        tally.record_new(message);
                    }
                })?;

            if tally.num > 0 {
                self.status.say(&format!(
                    "Found {} messages, {} to inbox.",
                    tally.num, tally.num_inbox
                ));
                info!(
                    uri = source.uri(),
                    num = tally.num,
                    num_inbox = tally.num_inbox,
                    "source polled"
                );
            }
            total.absorb(tally);
        }

        let total = total.finish();
        self.status.say(&format!(
            "Done polling; loaded {} new messages total",
            total.num
        ));
        *lock(&self.last_poll) = Some(Utc::now());
        info!(
            sources = sources.len(),
            num = total.num,
            num_inbox = total.num_inbox,
            "poll complete"
        );
        Ok(total)
    }

    // ── Idle state ───────────────────────────────────────────────────

    pub fn handle_idle(&self) {
        lock(&self.totals).handle_idle();
    }

    pub fn handle_unidle(&self) {
        lock(&self.totals).handle_unidle();
    }

    /// Apply the transitions between two idle-watch values. A wakeup
    /// that happened in between resets the totals even if the host has
    /// gone idle again since.
    pub fn apply_idle_change(&self, before: IdleState, after: IdleState) {
        let woke = after.wakeups > before.wakeups;
        if woke {
            debug!(wakeups = after.wakeups, "host active; resetting poll totals");
            self.handle_unidle();
        }
        if after.idle && (woke || !before.idle) {
            debug!("host idle; accumulating poll totals");
            self.handle_idle();
        }
    }

    /// Follow the relay's idle watch until `cancel` fires.
    pub async fn track_idle(
        self: Arc<Self>,
        mut idle: watch::Receiver<IdleState>,
        cancel: CancellationToken,
    ) {
        let mut seen = IdleState::default();
        loop {
            let current = *idle.borrow_and_update();
            self.apply_idle_change(seen, current);
            seen = current;
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = idle.changed() => if changed.is_err() {
                    break;
                },
            }
        }
    }
}

fn join_labels(labels: &mailpoll_core::LabelSet) -> String {
    labels
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Lock ignoring poison: every guarded value stays consistent across a
/// panicking hook.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
