//! [`Source`] implementation over a spool file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use mailpoll_core::labels::label_set;
use mailpoll_core::{
    LabelSet, PollEvent, PollSink, RawHeader, Source, SourceError, SourceId, SourceInfo,
};

use crate::record::SpoolRecord;
use crate::watcher::SpoolWatcher;

/// Per-source behaviour, as set in the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolConfig {
    pub usual: bool,
    pub read: bool,
    pub archived: bool,
    /// Added to every message this source adds.
    pub labels: LabelSet,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            usual: true,
            read: false,
            archived: false,
            labels: LabelSet::new(),
        }
    }
}

#[derive(Debug)]
struct SpoolState {
    watcher: SpoolWatcher,
    headers: HashMap<SourceInfo, RawHeader>,
    /// Set by a malformed line; the spool must be fixed by hand.
    fault: Option<SourceError>,
}

#[derive(Debug)]
pub struct SpoolSource {
    id: SourceId,
    uri: String,
    config: SpoolConfig,
    state: Mutex<SpoolState>,
}

impl SpoolSource {
    pub fn new(id: SourceId, path: PathBuf, config: SpoolConfig) -> Self {
        let uri = format!("spool:{}", path.display());
        Self {
            id,
            uri,
            config,
            state: Mutex::new(SpoolState {
                watcher: SpoolWatcher::new(path),
                headers: HashMap::new(),
                fault: None,
            }),
        }
    }

    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, SpoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turn a record into the event handed to the engine, remembering the
    /// header of an added message for `load_header`.
    fn admit(&self, record: SpoolRecord) -> PollEvent {
        match record {
            SpoolRecord::Add {
                info,
                labels,
                header,
            } => {
                let info = SourceInfo::new(info);
                let mut labels = label_set(labels);
                labels.extend(self.config.labels.iter().cloned());
                self.lock().headers.insert(info.clone(), header);
                PollEvent::Add { info, labels }
            }
            SpoolRecord::Delete { info } => {
                let info = SourceInfo::new(info);
                self.lock().headers.remove(&info);
                PollEvent::Delete { info }
            }
        }
    }
}

impl Source for SpoolSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn error(&self) -> Option<SourceError> {
        self.lock().fault.clone()
    }

    fn is_read(&self) -> bool {
        self.config.read
    }

    fn is_archived(&self) -> bool {
        self.config.archived
    }

    fn is_usual(&self) -> bool {
        self.config.usual
    }

    fn load_header(&self, info: &SourceInfo) -> Result<RawHeader, SourceError> {
        self.lock()
            .headers
            .get(info)
            .cloned()
            .ok_or_else(|| SourceError::UnknownInfo(info.clone()))
    }

    fn poll(&self, sink: &mut PollSink<'_>) -> Result<(), SourceError> {
        let pending = {
            let mut state = self.lock();
            if let Some(fault) = &state.fault {
                return Err(fault.clone());
            }
            state.watcher.read_pending()?
        };
        debug!(uri = %self.uri, lines = pending.len(), "spool lines pending");

        // The state lock is released around `sink`: the engine calls
        // `load_header` and `error` while handling each event.
        for line in pending {
            let parsed = line.text().and_then(|text| {
                if text.trim().is_empty() {
                    Ok(None)
                } else {
                    SpoolRecord::parse(text, line.number).map(Some)
                }
            });
            let record = match parsed {
                Ok(Some(record)) => record,
                Ok(None) => {
                    self.lock().watcher.commit(&line);
                    continue;
                }
                Err(e) => {
                    let fault = SourceError::from(e);
                    warn!(uri = %self.uri, line = line.number, error = %fault, "malformed spool line");
                    self.lock().fault = Some(fault.clone());
                    return Err(fault);
                }
            };
            if sink(self.admit(record)).is_break() {
                return Ok(());
            }
            self.lock().watcher.commit(&line);
        }
        Ok(())
    }
}
