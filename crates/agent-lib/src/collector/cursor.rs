//! Per-file read cursors
//!
//! A `CursorStore` belongs to exactly one watch task. It is never shared, so
//! the map needs no locking.

use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Last-read byte offset for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCursor {
    pub path: PathBuf,
    pub byte_offset: u64,
}

/// Result of reading the unread range of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Bytes appended since the previous cursor position
    Appended(Vec<u8>),
    /// Length equals the stored offset
    Unchanged,
    /// The path disappeared before it could be read
    Vanished,
}

/// In-memory map from file path to cursor
#[derive(Debug, Default)]
pub struct CursorStore {
    cursors: HashMap<PathBuf, FileCursor>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset for `path`, if a cursor exists
    pub fn offset(&self, path: &Path) -> Option<u64> {
        self.cursors.get(path).map(|c| c.byte_offset)
    }

    /// Start (or restart) a cursor at byte 0
    pub fn reset(&mut self, path: &Path) {
        self.set(path, 0);
    }

    /// Drop the cursor for `path`. Returns the cursor that was removed.
    pub fn remove(&mut self, path: &Path) -> Option<FileCursor> {
        self.cursors.remove(path)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    fn set(&mut self, path: &Path, byte_offset: u64) {
        self.cursors
            .entry(path.to_path_buf())
            .and_modify(|c| c.byte_offset = byte_offset)
            .or_insert_with(|| FileCursor {
                path: path.to_path_buf(),
                byte_offset,
            });
    }

    /// Read the bytes of `path` that lie beyond its cursor and advance the cursor
    ///
    /// A file shorter than the stored offset was truncated, so reading restarts
    /// at byte 0. A path that no longer exists has its cursor removed.
    pub async fn read_delta(&mut self, path: &Path) -> std::io::Result<Delta> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.remove(path);
                return Ok(Delta::Vanished);
            }
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        let mut offset = self.offset(path).unwrap_or(0);

        if len < offset {
            debug!(path = %path.display(), offset, len, "File truncated, resetting cursor");
            offset = 0;
            self.set(path, 0);
        }

        if len == offset {
            return Ok(Delta::Unchanged);
        }

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity((len - offset) as usize);
        file.take(len - offset).read_to_end(&mut buf).await?;

        // The file may have shrunk between metadata and read.
        if buf.is_empty() {
            return Ok(Delta::Unchanged);
        }

        self.set(path, offset + buf.len() as u64);
        Ok(Delta::Appended(buf))
    }
}
