//! Extension points fired by the poll pipeline.
//!
//! Hooks run synchronously on the polling thread, in registration order.
//! A hook must not register further hooks from inside its own body.

use std::fmt;
use std::sync::RwLock;

use tracing::{debug, warn};

use mailpoll_core::Message;

use crate::outcome::FromAndSubject;

// ─── Hook points ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeAddMessage,
    BeforePoll,
    AfterPoll,
}

impl HookPoint {
    pub const ALL: [Self; 3] = [Self::BeforeAddMessage, Self::BeforePoll, Self::AfterPoll];

    pub fn name(self) -> &'static str {
        match self {
            Self::BeforeAddMessage => "before-add-message",
            Self::BeforePoll => "before-poll",
            Self::AfterPoll => "after-poll",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::BeforeAddMessage => {
                "Runs on every added message, after label merging and before it is \
                 written to the index.\nVariables: message"
            }
            Self::BeforePoll => "Runs before a poll sweep begins.\nNo variables.",
            Self::AfterPoll => {
                "Runs after a poll sweep completes.\nVariables: num, num_inbox, \
                 num_inbox_total_unread (computed on first use), from_and_subj, \
                 from_and_subj_inbox"
            }
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── after-poll variables ────────────────────────────────────────────

/// Variables handed to `after-poll` hooks.
pub struct AfterPoll<'a> {
    pub num: usize,
    pub num_inbox: usize,
    pub from_and_subj: &'a [FromAndSubject],
    pub from_and_subj_inbox: &'a [FromAndSubject],
    unread_inbox: &'a dyn Fn() -> usize,
}

impl<'a> AfterPoll<'a> {
    pub fn new(
        num: usize,
        num_inbox: usize,
        from_and_subj: &'a [FromAndSubject],
        from_and_subj_inbox: &'a [FromAndSubject],
        unread_inbox: &'a dyn Fn() -> usize,
    ) -> Self {
        Self {
            num,
            num_inbox,
            from_and_subj,
            from_and_subj_inbox,
            unread_inbox,
        }
    }

    /// Unread messages currently in the inbox. Queries the index on each
    /// call; hooks that never ask never pay for it.
    pub fn num_inbox_total_unread(&self) -> usize {
        (self.unread_inbox)()
    }
}

impl fmt::Debug for AfterPoll<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AfterPoll")
            .field("num", &self.num)
            .field("num_inbox", &self.num_inbox)
            .field("from_and_subj", &self.from_and_subj)
            .field("from_and_subj_inbox", &self.from_and_subj_inbox)
            .finish_non_exhaustive()
    }
}

// ─── Registry ────────────────────────────────────────────────────────

type MessageHook = Box<dyn Fn(&Message) + Send + Sync>;
type PollHook = Box<dyn Fn() + Send + Sync>;
type AfterPollHook = Box<dyn Fn(&AfterPoll<'_>) + Send + Sync>;

/// Registered hooks, grouped by point.
#[derive(Default)]
pub struct HookRegistry {
    before_add_message: RwLock<Vec<MessageHook>>,
    before_poll: RwLock<Vec<PollHook>>,
    after_poll: RwLock<Vec<AfterPollHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_add_message(&self, hook: impl Fn(&Message) + Send + Sync + 'static) {
        push(&self.before_add_message, Box::new(hook), HookPoint::BeforeAddMessage);
    }

    pub fn on_before_poll(&self, hook: impl Fn() + Send + Sync + 'static) {
        push(&self.before_poll, Box::new(hook), HookPoint::BeforePoll);
    }

    pub fn on_after_poll(&self, hook: impl Fn(&AfterPoll<'_>) + Send + Sync + 'static) {
        push(&self.after_poll, Box::new(hook), HookPoint::AfterPoll);
    }

    /// Number of hooks registered at `point`.
    pub fn count(&self, point: HookPoint) -> usize {
        match point {
            HookPoint::BeforeAddMessage => len(&self.before_add_message),
            HookPoint::BeforePoll => len(&self.before_poll),
            HookPoint::AfterPoll => len(&self.after_poll),
        }
    }

    pub fn run_before_add_message(&self, message: &Message) {
        if let Ok(hooks) = self.before_add_message.read() {
            for hook in hooks.iter() {
                hook(message);
            }
        }
    }

    pub fn run_before_poll(&self) {
        if let Ok(hooks) = self.before_poll.read() {
            debug!(hooks = hooks.len(), "running before-poll hooks");
            for hook in hooks.iter() {
                hook();
            }
        }
    }

    pub fn run_after_poll(&self, vars: &AfterPoll<'_>) {
        if let Ok(hooks) = self.after_poll.read() {
            debug!(hooks = hooks.len(), "running after-poll hooks");
            for hook in hooks.iter() {
                hook(vars);
            }
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("HookRegistry");
        for point in HookPoint::ALL {
            d.field(point.name(), &self.count(point));
        }
        d.finish()
    }
}

fn push<T>(slot: &RwLock<Vec<T>>, hook: T, point: HookPoint) {
    match slot.write() {
        Ok(mut hooks) => hooks.push(hook),
        Err(_) => warn!(%point, "hook registry lock poisoned; hook dropped"),
    }
}

fn len<T>(slot: &RwLock<Vec<T>>) -> usize {
    slot.read().map(|h| h.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mailpoll_core::{Location, MessageId, SourceId, SourceInfo};

    use super::*;

    #[test]
    fn hooks_run_in_registration_order() {
        let registry = HookRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            registry.on_before_poll(move || order.lock().expect("lock").push(n));
        }
        registry.run_before_poll();
        assert_eq!(*order.lock().expect("lock"), vec![0, 1, 2]);
        assert_eq!(registry.count(HookPoint::BeforePoll), 3);
    }

    #[test]
    fn before_add_message_sees_message() {
        let registry = HookRegistry::new();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        registry.on_before_add_message(move |m| {
            *seen2.lock().expect("lock") = Some(m.id.clone());
        });

        let m = Message::new(
            MessageId::new("a@x"),
            Location::new(SourceId(1), SourceInfo::new("1")),
        );
        registry.run_before_add_message(&m);
        assert_eq!(*seen.lock().expect("lock"), Some(MessageId::new("a@x")));
    }

    #[test]
    fn unread_count_is_lazy() {
        let calls = AtomicUsize::new(0);
        let unread = || {
            calls.fetch_add(1, Ordering::SeqCst);
            7
        };
        let vars = AfterPoll::new(2, 1, &[], &[], &unread);

        let registry = HookRegistry::new();
        registry.on_after_poll(|vars| assert_eq!(vars.num, 2));
        registry.run_after_poll(&vars);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(vars.num_inbox_total_unread(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let registry = HookRegistry::new();
        registry.run_before_poll();
        let unread = || 0;
        registry.run_after_poll(&AfterPoll::new(0, 0, &[], &[], &unread));
        assert_eq!(registry.count(HookPoint::AfterPoll), 0);
    }

    #[test]
    fn hook_points_have_names() {
        let names: Vec<_> = HookPoint::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["before-add-message", "before-poll", "after-poll"]);
        assert!(HookPoint::AfterPoll.description().contains("num_inbox_total_unread"));
    }
}
