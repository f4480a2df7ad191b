//! Spool line format.

use serde::Deserialize;

use mailpoll_core::RawHeader;

use crate::error::SpoolError;

/// One spool line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SpoolRecord {
    /// A message was stored at `info`. Header fields sit at the top level
    /// of the record next to `info` and `labels`.
    Add {
        info: String,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(flatten)]
        header: RawHeader,
    },
    /// The message at `info` was removed.
    Delete { info: String },
}

impl SpoolRecord {
    /// Parse line `line` (1-based, for error reporting).
    pub fn parse(text: &str, line: u64) -> Result<Self, SpoolError> {
        serde_json::from_str(text).map_err(|source| SpoolError::Parse { line, source })
    }

    pub fn info(&self) -> &str {
        match self {
            Self::Add { info, .. } | Self::Delete { info } => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_with_header_fields() {
        let record = SpoolRecord::parse(
            r#"{"op":"add","info":"7","message_id":"<a@b>","from":"Ada <ada@example.org>","subject":"hi","date":"2026-02-25T13:00:00Z","refs":["<x@y>"],"read":true,"labels":["inbox","work"]}"#,
            1,
        )
        .expect("parse");

        let SpoolRecord::Add {
            info,
            labels,
            header,
        } = record
        else {
            panic!("expected add");
        };
        assert_eq!(info, "7");
        assert_eq!(labels, vec!["inbox", "work"]);
        assert_eq!(header.message_id.as_deref(), Some("<a@b>"));
        assert_eq!(header.subject.as_deref(), Some("hi"));
        assert_eq!(header.refs, vec!["<x@y>"]);
        assert!(header.read);
        assert!(header.date.is_some());
    }

    #[test]
    fn add_with_only_info() {
        let record = SpoolRecord::parse(r#"{"op":"add","info":"1"}"#, 1).expect("parse");
        assert_eq!(
            record,
            SpoolRecord::Add {
                info: "1".into(),
                labels: Vec::new(),
                header: RawHeader::default(),
            }
        );
    }

    #[test]
    fn delete_record() {
        let record = SpoolRecord::parse(r#"{"op":"delete","info":"9"}"#, 1).expect("parse");
        assert_eq!(record.info(), "9");
        assert!(matches!(record, SpoolRecord::Delete { .. }));
    }

    #[test]
    fn bad_lines_report_their_line_number() {
        for text in [r#"{"op":"move","info":"1"}"#, r#"{"op":"add"}"#, "not json"] {
            match SpoolRecord::parse(text, 12) {
                Err(SpoolError::Parse { line, .. }) => assert_eq!(line, 12),
                other => panic!("expected parse error for {text}, got {other:?}"),
            }
        }
    }
}
