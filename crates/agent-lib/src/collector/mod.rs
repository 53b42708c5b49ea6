//! Event collection from the local filesystem
//!
//! Two sources feed the pipeline: directory watchers that report file
//! changes with the newly appended bytes, and log tailers that poll a fixed
//! list of files and classify each new line.

mod cursor;
mod severity;
mod tailer;
mod watcher;

pub use cursor::{CursorStore, Delta, FileCursor};
pub use severity::{SeverityClassifier, SeverityKeywords};
pub use tailer::{LogTailer, LogTailerBuilder, TailCursor, TailerConfig, TailerHandle};
pub use watcher::{classify_event, DirectoryWatcher, WatchState, WatcherConfig, WatcherHandle};
