//! Status surface: where progress text, flashes and broken-source reports go.

use std::sync::Mutex;

use tracing::{debug, info, warn};

/// User-visible status output.
pub trait StatusSurface: Send + Sync {
    /// Transient progress text while a poll runs.
    fn say(&self, text: &str);

    /// One-line summary shown after a poll.
    fn flash(&self, text: &str);

    /// Surface the list of broken sources. `force_to_top` asks for the
    /// report to be shown in front of whatever the user is looking at.
    fn report_broken_sources(&self, force_to_top: bool);
}

/// Status surface that writes everything to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatus;

impl StatusSurface for LogStatus {
    fn say(&self, text: &str) {
        debug!(target: "mailpoll::status", "{text}");
    }

    fn flash(&self, text: &str) {
        info!(target: "mailpoll::status", "{text}");
    }

    fn report_broken_sources(&self, force_to_top: bool) {
        warn!(target: "mailpoll::status", force_to_top, "one or more sources are broken");
    }
}

/// Status surface that keeps everything it is told, for embedding hosts
/// that render status themselves.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    inner: Mutex<Recorded>,
}

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub said: Vec<String>,
    pub flashes: Vec<String>,
    pub broken_reports: Vec<bool>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Recorded {
        self.lock().clone()
    }

    pub fn last_flash(&self) -> Option<String> {
        self.lock().flashes.last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl StatusSurface for RecordingStatus {
    fn say(&self, text: &str) {
        self.lock().said.push(text.to_string());
    }

    fn flash(&self, text: &str) {
        self.lock().flashes.push(text.to_string());
    }

    fn report_broken_sources(&self, force_to_top: bool) {
        self.lock().broken_reports.push(force_to_top);
    }
}
