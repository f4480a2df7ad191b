//! Running totals across polls.
//!
//! While the host is idle, results from consecutive polls pile up into one
//! notification instead of flashing once per poll. While the host is
//! interactive, every poll reports only its own results.

use mailpoll_core::LabelSet;

use crate::outcome::{PollOutcome, pluralize};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningTotals {
    pub num: usize,
    pub num_inbox: usize,
    pub loaded_labels: LabelSet,
}

impl RunningTotals {
    /// Human-readable summary flashed after a poll.
    pub fn flash_text(&self) -> String {
        if self.num == 0 {
            return "No new messages.".to_string();
        }
        let labels: Vec<&str> = self.loaded_labels.iter().map(|l| l.as_str()).collect();
        format!(
            "Loaded {}, {} to inbox. Labels: {}",
            pluralize(self.num, "new message"),
            self.num_inbox,
            labels.join(", ")
        )
    }
}

/// Idle-aware accumulator.
///
/// | event   | effect                                             |
/// |---------|----------------------------------------------------|
/// | idle    | later polls accumulate                             |
/// | unidle  | totals reset now, and before every following poll  |
/// | poll    | results added to totals (after a pending reset)    |
#[derive(Debug, Clone, Default)]
pub struct TotalsAccumulator {
    totals: RunningTotals,
    should_clear: bool,
}

impl TotalsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_idle(&mut self) {
        self.should_clear = false;
    }

    pub fn handle_unidle(&mut self) {
        self.should_clear = true;
        self.clear();
    }

    /// Add one poll's results and return the totals to report.
    pub fn record(&mut self, outcome: &PollOutcome) -> RunningTotals {
        if self.should_clear {
            self.clear();
        }
        self.totals.num += outcome.num;
        self.totals.num_inbox += outcome.num_inbox;
        self.totals
            .loaded_labels
            .extend(outcome.loaded_labels.iter().cloned());
        self.totals.clone()
    }

    pub fn totals(&self) -> &RunningTotals {
        &self.totals
    }

    fn clear(&mut self) {
        self.totals = RunningTotals::default();
    }
}
