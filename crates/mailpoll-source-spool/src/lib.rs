//! mailpoll-source-spool: a file-backed mail source.
//!
//! A spool is an append-only JSON-lines file. Each line is one record:
//!
//! ```text
//! {"op":"add","info":"42","message_id":"<a@b>","subject":"hi","labels":["inbox"]}
//! {"op":"delete","info":"42"}
//! ```
//!
//! The source remembers how far it has read, buffers nothing past the last
//! complete line, and starts over when the file is replaced.

pub mod error;
pub mod record;
pub mod source;
pub mod watcher;

pub use error::SpoolError;
pub use record::SpoolRecord;
pub use source::{SpoolConfig, SpoolSource};
pub use watcher::{SpoolLine, SpoolWatcher};
