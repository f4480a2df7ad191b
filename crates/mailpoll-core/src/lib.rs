//! mailpoll-core: message model, label rules, and the collaborator traits
//! (sources, index, label registry) the poll engine drives.
//!
//! Pure library with no async runtime. In-process reference collaborators
//! live in [`memory`].

pub mod error;
pub mod index;
pub mod labels;
pub mod memory;
pub mod source;
pub mod types;

pub use error::{IndexError, SourceError};
pub use index::{Index, LabelRegistry, MessageFilter};
pub use labels::{Label, LabelSet};
pub use memory::{MemoryIndex, MemoryLabelRegistry, MemorySource};
pub use source::{HeaderMessageBuilder, MessageBuilder, PollSink, RawHeader, Source};
pub use types::{Location, Message, MessageId, Person, PollEvent, SourceId, SourceInfo};
