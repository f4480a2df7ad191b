//! Source manager: the configured sources and the usual/unusual split.

use std::sync::{Arc, RwLock};

use tracing::warn;

use mailpoll_core::{Source, SourceId};

/// Ordered set of configured sources.
///
/// Usual sources are swept by every scheduled poll; unusual sources only
/// when explicitly asked for.
#[derive(Debug, Default)]
pub struct SourceManager {
    sources: RwLock<Vec<Arc<dyn Source>>>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources<I: IntoIterator<Item = Arc<dyn Source>>>(sources: I) -> Self {
        Self {
            sources: RwLock::new(sources.into_iter().collect()),
        }
    }

    /// Add a source. A source whose id is already taken is rejected.
    pub fn add(&self, source: Arc<dyn Source>) -> bool {
        let Ok(mut sources) = self.sources.write() else {
            warn!("source manager lock poisoned; source not added");
            return false;
        };
        if sources.iter().any(|s| s.id() == source.id()) {
            warn!(id = %source.id(), uri = source.uri(), "duplicate source id");
            return false;
        }
        sources.push(source);
        true
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn Source>> {
        self.select(|s| s.id() == id).into_iter().next()
    }

    pub fn sources(&self) -> Vec<Arc<dyn Source>> {
        self.select(|_| true)
    }

    pub fn usual_sources(&self) -> Vec<Arc<dyn Source>> {
        self.select(|s| s.is_usual())
    }

    pub fn unusual_sources(&self) -> Vec<Arc<dyn Source>> {
        self.select(|s| !s.is_usual())
    }

    pub fn len(&self) -> usize {
        self.sources.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, keep: impl Fn(&dyn Source) -> bool) -> Vec<Arc<dyn Source>> {
        self.sources
            .read()
            .map(|sources| {
                sources
                    .iter()
                    .filter(|s| keep(s.as_ref()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
