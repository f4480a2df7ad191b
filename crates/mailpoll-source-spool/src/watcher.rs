//! Spool file reader.
//!
//! Tracks the byte offset of the last consumed line and the file's inode.
//! Only complete lines are returned; a partial line at EOF is left in the
//! file and read again, whole, on a later call. Nothing is consumed until
//! the caller commits it.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::SpoolError;

/// One complete line read from the spool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolLine {
    /// Line content without the trailing newline, not yet decoded.
    pub bytes: Vec<u8>,
    /// 1-based line number within the current file.
    pub number: u64,
    /// Byte offset just past this line's newline.
    pub end: u64,
}

impl SpoolLine {
    pub fn text(&self) -> Result<&str, SpoolError> {
        std::str::from_utf8(&self.bytes).map_err(|source| SpoolError::Encoding {
            line: self.number,
            source,
        })
    }
}

#[derive(Debug)]
pub struct SpoolWatcher {
    path: PathBuf,
    /// Offset just past the last committed line.
    offset: u64,
    /// Number of the last committed line.
    line: u64,
    /// Inode number (for rotation detection). 0 = not seen yet.
    inode: u64,
}

impl SpoolWatcher {
    /// Watch `path` from its first line.
    pub fn new(path: PathBuf) -> Self {
        let inode = file_metadata(&path).map(|(_, ino)| ino).unwrap_or(0);
        Self {
            path,
            offset: 0,
            line: 0,
            inode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read every complete line after the committed offset.
    ///
    /// A missing file reads as empty. If the file was replaced (new inode)
    /// or truncated below the committed offset, reading restarts at the top.
    pub fn read_pending(&mut self) -> Result<Vec<SpoolLine>, SpoolError> {
        let Some((size, inode)) = file_metadata(&self.path) else {
            debug!(path = %self.path.display(), "spool file not present");
            return Ok(Vec::new());
        };
        let replaced = self.inode != 0 && inode != self.inode;
        if replaced || size < self.offset {
            info!(
                path = %self.path.display(),
                replaced,
                offset = self.offset,
                size,
                "spool rotated; reading from the start"
            );
            self.offset = 0;
            self.line = 0;
        }
        self.inode = inode;

        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.offset))
            .map_err(|e| self.io_error(e))?;

        let mut lines = Vec::new();
        let mut pos = self.offset;
        let mut number = self.line;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            // Bytes, not `read_line`: a line that is not UTF-8 must still
            // come back so the caller can reject it by line number.
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| self.io_error(e))?;
            // EOF, or a partial line that is still being written.
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            pos += read as u64;
            number += 1;
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            lines.push(SpoolLine {
                bytes: buf.clone(),
                number,
                end: pos,
            });
        }
        Ok(lines)
    }

    /// Mark `line` (and everything before it) as consumed.
    pub fn commit(&mut self, line: &SpoolLine) {
        self.offset = line.end;
        self.line = line.number;
    }

    fn io_error(&self, source: io::Error) -> SpoolError {
        SpoolError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Get file size and inode for rotation detection.
fn file_metadata(path: &Path) -> Option<(u64, u64)> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(path).ok().map(|m| (m.len(), m.ino()))
    }
    #[cfg(not(unix))]
    {
        fs::metadata(path).ok().map(|m| (m.len(), 0))
    }
}
