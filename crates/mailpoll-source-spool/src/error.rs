use std::io;
use std::path::PathBuf;

use mailpoll_core::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("failed to read spool {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed record at line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid UTF-8 at line {line}: {source}")]
    Encoding {
        line: u64,
        #[source]
        source: std::str::Utf8Error,
    },
}

impl From<SpoolError> for SourceError {
    fn from(e: SpoolError) -> Self {
        match e {
            SpoolError::Io { .. } => SourceError::Io(e.to_string()),
            SpoolError::Parse { line, source } => SourceError::Malformed {
                line,
                detail: source.to_string(),
            },
            SpoolError::Encoding { line, source } => SourceError::Malformed {
                line,
                detail: source.to_string(),
            },
        }
    }
}
