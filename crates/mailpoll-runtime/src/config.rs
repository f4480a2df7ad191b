//! TOML configuration.
//!
//! ```toml
//! poll_interval = 300
//!
//! [[sources]]
//! path = "/var/spool/mailpoll/work.jsonl"
//! labels = ["work"]
//!
//! [[sources]]
//! path = "/var/spool/mailpoll/lists.jsonl"
//! id = 7
//! usual = false
//! archived = true
//! read = true
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use mailpoll_core::labels::label_set;
use mailpoll_core::{Source, SourceId};
use mailpoll_engine::DEFAULT_POLL_INTERVAL;
use mailpoll_source_spool::{SpoolConfig, SpoolSource};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Seconds between scheduled polls.
    pub poll_interval: u64,
    pub sources: Vec<SourceEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL.as_secs(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default = "default_true")]
    pub usual: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load `path`. A missing file is only an error when `required`.
    pub fn load(path: &Path, required: bool) -> anyhow::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading config {}", path.display()));
            }
        };
        Self::parse(&text).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.poll_interval == 0 {
            bail!("poll_interval must be at least 1 second");
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Build one spool source per entry. Entries without an explicit id
    /// take the lowest ids not claimed by any entry, in file order.
    pub fn build_sources(&self) -> anyhow::Result<Vec<Arc<dyn Source>>> {
        let mut claimed = BTreeSet::new();
        for id in self.sources.iter().filter_map(|s| s.id) {
            if !claimed.insert(id) {
                bail!("source id {id} is used more than once");
            }
        }

        let mut next = 1u64;
        let mut sources: Vec<Arc<dyn Source>> = Vec::with_capacity(self.sources.len());
        for entry in &self.sources {
            let id = match entry.id {
                Some(id) => id,
                None => {
                    while claimed.contains(&next) {
                        next += 1;
                    }
                    claimed.insert(next);
                    next
                }
            };
            let config = SpoolConfig {
                usual: entry.usual,
                read: entry.read,
                archived: entry.archived,
                labels: label_set(entry.labels.iter().map(String::as_str)),
            };
            sources.push(Arc::new(SpoolSource::new(
                SourceId(id),
                entry.path.clone(),
                config,
            )));
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
    }

    #[test]
    fn source_entries_with_defaults() {
        let config = Config::parse(
            r#"
            poll_interval = 60

            [[sources]]
            path = "/tmp/a.jsonl"
            labels = ["Work"]

            [[sources]]
            path = "/tmp/b.jsonl"
            usual = false
            archived = true
            "#,
        )
        .expect("parse");

        assert_eq!(config.poll_interval, 60);
        assert_eq!(config.sources.len(), 2);
        let a = &config.sources[0];
        assert!(a.usual && !a.read && !a.archived);
        assert_eq!(a.labels, vec!["Work"]);
        let b = &config.sources[1];
        assert!(!b.usual && b.archived);
    }

    #[test]
    fn unknown_keys_and_zero_interval_are_rejected() {
        assert!(Config::parse("poll_intervl = 5").is_err());
        assert!(Config::parse("poll_interval = 0").is_err());
        assert!(Config::parse("[[sources]]\nid = 1").is_err(), "path is required");
    }

    #[test]
    fn ids_fill_gaps_around_explicit_ones() {
        let config = Config::parse(
            r#"
            [[sources]]
            path = "/tmp/a.jsonl"
            [[sources]]
            path = "/tmp/b.jsonl"
            id = 2
            [[sources]]
            path = "/tmp/c.jsonl"
            "#,
        )
        .expect("parse");

        let ids: Vec<SourceId> = config
            .build_sources()
            .expect("build")
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(ids, vec![SourceId(1), SourceId(2), SourceId(3)]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let config = Config::parse(
            r#"
            [[sources]]
            path = "/tmp/a.jsonl"
            id = 4
            [[sources]]
            path = "/tmp/b.jsonl"
            id = 4
            "#,
        )
        .expect("parse");
        assert!(config.build_sources().is_err());
    }

    #[test]
    fn missing_file_is_optional_unless_required() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        assert_eq!(Config::load(&path, false).expect("defaults"), Config::default());
        assert!(Config::load(&path, true).is_err());

        std::fs::write(&path, "poll_interval = 30\n").expect("write");
        assert_eq!(Config::load(&path, true).expect("load").poll_interval, 30);
    }
}
