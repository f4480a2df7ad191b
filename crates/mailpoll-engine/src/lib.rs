//! mailpoll-engine: polls mail sources, reconciles their events against the
//! index, and reports what arrived.
//!
//! Pipeline: [`scheduler::PollScheduler`] (or a manual trigger) →
//! [`manager::PollManager`] (single-flight sweep over the selected sources)
//! → [`poll_from::PollEngine`] (per-source identity resolution and label
//! merge) → index / label registry / hooks / update relay → aggregated
//! [`outcome::PollOutcome`] → [`totals::TotalsAccumulator`] → status surface.

pub mod error;
pub mod hooks;
pub mod manager;
pub mod outcome;
pub mod poll_from;
pub mod relay;
pub mod scheduler;
pub mod sources;
pub mod status;
pub mod totals;

pub use error::PollError;
pub use hooks::{AfterPoll, HookPoint, HookRegistry};
pub use manager::{PollManager, Services};
pub use outcome::{FromAndSubject, PollCounts, PollOutcome};
pub use poll_from::{PollAction, PollEngine};
pub use relay::{IdleState, Update, UpdateRelay};
pub use scheduler::{DEFAULT_POLL_INTERVAL, PollScheduler};
pub use sources::SourceManager;
pub use status::{LogStatus, Recorded, RecordingStatus, StatusSurface};
pub use totals::{RunningTotals, TotalsAccumulator};

pub use mailpoll_core as core;
