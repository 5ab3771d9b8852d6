//! Incremental line reader over a growing file.
//!
//! Reads only complete lines appended since the last read. A trailing line
//! without its terminator is left for the next call.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::WatcherError;

/// Lines returned by one [`FileCursor::read_new_lines`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CursorRead {
    /// Complete lines in file order, terminators stripped.
    pub lines: Vec<String>,
    /// The file had shrunk below the committed offset and was re-read from 0.
    pub reset: bool,
}

impl CursorRead {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Byte-offset tracker for one tailed file.
///
/// The offset only moves forward past complete lines, except when the file
/// is truncated below it, in which case it restarts at zero.
#[derive(Debug)]
pub struct FileCursor {
    path: PathBuf,
    offset: u64,
}

impl FileCursor {
    /// Create a cursor at the start of the file.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Create a cursor starting at a specific offset.
    #[must_use]
    pub fn with_offset(path: PathBuf, offset: u64) -> Self {
        Self { path, offset }
    }

    /// Get the committed byte offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read complete lines appended since the last call.
    ///
    /// A missing or unreadable file yields an empty read. If the file is
    /// shorter than the committed offset the offset is reset to 0 and all
    /// current content is returned with `reset` set.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures other than "not found" and
    /// "permission denied".
    pub async fn read_new_lines(&mut self) -> Result<CursorRead, WatcherError> {
        self.read(false).await
    }

    /// Like [`read_new_lines`](Self::read_new_lines), but also returns a
    /// trailing line that has no terminator yet and commits past it.
    ///
    /// For one-shot reads of a file that is not expected to grow.
    ///
    /// # Errors
    ///
    /// Same as [`read_new_lines`](Self::read_new_lines).
    pub async fn read_to_end_lines(&mut self) -> Result<CursorRead, WatcherError> {
        self.read(true).await
    }

    async fn read(&mut self, include_partial: bool) -> Result<CursorRead, WatcherError> {
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if is_transient(&e) => {
                tracing::trace!(path = %self.path.display(), error = %e, "File not readable yet");
                return Ok(CursorRead::default());
            }
            Err(e) => return Err(WatcherError::Io(e)),
        };

        let file_len = match file.metadata().await {
            Ok(metadata) => metadata.len(),
            Err(e) if is_transient(&e) => return Ok(CursorRead::default()),
            Err(e) => return Err(WatcherError::Io(e)),
        };

        let mut read = CursorRead::default();
        if file_len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = file_len,
                "File truncated, resetting offset to 0"
            );
            self.offset = 0;
            read.reset = true;
        }

        if file_len == self.offset {
            return Ok(read);
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::with_capacity(usize::try_from(file_len - self.offset).unwrap_or(0));
        file.read_to_end(&mut buf).await?;

        let consumed = match buf.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) if !include_partial || last_newline + 1 == buf.len() => {
                &buf[..last_newline]
            }
            _ if include_partial => buf.as_slice(),
            // Only a partial line so far.
            _ => return Ok(read),
        };

        read.lines = consumed
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect();
        self.offset += if include_partial {
            buf.len() as u64
        } else {
            (consumed.len() + 1) as u64
        };

        Ok(read)
    }

    /// Reset the offset to the beginning of the file.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied)
}
