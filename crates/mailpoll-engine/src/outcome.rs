//! Per-poll results.

use mailpoll_core::labels::{LabelSet, counts_toward_inbox, reportable_labels};
use mailpoll_core::Message;

/// Sender and subject of one added message, as shown in notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromAndSubject {
    pub from: Option<String>,
    pub subject: String,
}

impl FromAndSubject {
    pub fn of(message: &Message) -> Self {
        Self {
            from: message.from_longname(),
            subject: message.subject.clone(),
        }
    }
}

/// Counts returned to `poll` callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCounts {
    pub num: usize,
    pub num_inbox: usize,
}

/// Aggregate result of one poll sweep. Built fresh for every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub num: usize,
    pub num_inbox: usize,
    pub from_and_subj: Vec<FromAndSubject>,
    pub from_and_subj_inbox: Vec<FromAndSubject>,
    /// Labels carried by newly added messages.
    pub loaded_labels: LabelSet,
}

impl PollOutcome {
    /// Account for a message seen for the first time.
    pub fn record_new(&mut self, message: &Message) {
        self.loaded_labels.extend(message.labels.iter().cloned());
        self.num += 1;
        let entry = FromAndSubject::of(message);
        if counts_toward_inbox(&message.labels) {
            self.num_inbox += 1;
            self.from_and_subj_inbox.push(entry.clone());
        }
        self.from_and_subj.push(entry);
    }

    /// Fold one source's tally into the sweep total.
    pub fn absorb(&mut self, other: PollOutcome) {
        self.num += other.num;
        self.num_inbox += other.num_inbox;
        self.from_and_subj.extend(other.from_and_subj);
        self.from_and_subj_inbox.extend(other.from_and_subj_inbox);
        self.loaded_labels.extend(other.loaded_labels);
    }

    /// Drop the labels not worth reporting. Applied once, after the sweep.
    pub fn finish(mut self) -> Self {
        self.loaded_labels = reportable_labels(&self.loaded_labels);
        self
    }

    pub fn counts(&self) -> PollCounts {
        PollCounts {
            num: self.num,
            num_inbox: self.num_inbox,
        }
    }
}

/// `"1 new message"`, `"3 new messages"`.
pub(crate) fn pluralize(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use mailpoll_core::labels::label_set;
    use mailpoll_core::{Location, MessageId, Person, SourceId, SourceInfo};

    use super::*;

    fn message(id: &str, labels: &[&str]) -> Message {
        let mut m = Message::new(
            MessageId::new(id),
            Location::new(SourceId(1), SourceInfo::new(id)),
        );
        m.labels = label_set(labels.iter().copied());
        m.from = Some(Person::parse("Ada <ada@example.org>"));
        m.subject = format!("subject {id}");
        m
    }

    #[test]
    fn inbox_arrivals_are_counted_separately() {
        let mut out = PollOutcome::default();
        out.record_new(&message("1", &["inbox", "unread"]));
        out.record_new(&message("2", &["inbox", "spam"]));
        out.record_new(&message("3", &["work"]));

        assert_eq!(out.counts(), PollCounts { num: 3, num_inbox: 1 });
        assert_eq!(out.from_and_subj.len(), 3);
        assert_eq!(
            out.from_and_subj_inbox,
            vec![FromAndSubject {
                from: Some("Ada <ada@example.org>".into()),
                subject: "subject 1".into(),
            }]
        );
    }

    #[test]
    fn absorb_and_finish() {
        let mut a = PollOutcome::default();
        a.record_new(&message("1", &["inbox", "killed", "work"]));
        let mut b = PollOutcome::default();
        b.record_new(&message("2", &["inbox", "unread", "rust"]));

        a.absorb(b);
        let done = a.finish();
        assert_eq!(done.num, 2);
        assert_eq!(done.num_inbox, 1);
        assert_eq!(done.loaded_labels, label_set(["work", "rust"]));
    }

    #[test]
    fn pluralize_counts() {
        assert_eq!(pluralize(1, "new message"), "1 new message");
        assert_eq!(pluralize(0, "new message"), "0 new messages");
        assert_eq!(pluralize(4, "new message"), "4 new messages");
    }
}
