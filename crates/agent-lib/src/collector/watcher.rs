//! Directory watching with incremental content reads
//!
//! Filesystem notifications arrive on notify's backend thread and are handed
//! to a single tokio task per watched directory. That task owns the
//! `CursorStore`, so every file's cursor has exactly one writer.

use super::cursor::{CursorStore, Delta};
use crate::error::WatchError;
use crate::models::{ChangeEvent, ChangeKind};
use crate::observability::PipelineMetrics;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Configuration for a directory watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directory to watch
    pub root: PathBuf,
    /// Watch subdirectories too
    pub recursive: bool,
    /// Pause before reading a modified file, to let an in-progress write land
    pub settle_delay: Duration,
    /// Capacity of the outbound event channel
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            recursive: true,
            settle_delay: Duration::from_millis(50),
            channel_capacity: 1024,
        }
    }
}

impl WatcherConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }
}

/// Translate one OS notification into `(path, kind)` pairs
///
/// Access and metadata-only notifications carry no content change and are
/// ignored.
pub fn classify_event(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths are [from, to]
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push((from.clone(), ChangeKind::Deleted));
            }
            if let Some(to) = event.paths.get(1) {
                out.push((to.clone(), ChangeKind::Created));
            }
            return out;
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Backend could not tell which side of the rename this is.
            return event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    };
                    (p.clone(), kind)
                })
                .collect();
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event.paths.iter().map(|p| (p.clone(), kind)).collect()
}

/// Cursor state and change handling for one watched directory
pub struct WatchState {
    cursors: CursorStore,
    settle_delay: Duration,
    metrics: PipelineMetrics,
}

impl WatchState {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            cursors: CursorStore::new(),
            settle_delay,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// Apply one classified change. Returns the event to emit, if any.
    pub async fn apply(&mut self, path: &Path, kind: ChangeKind) -> Option<ChangeEvent> {
        let before = self.cursors.len();
        let event = self.apply_inner(path, kind).await;
        let after = self.cursors.len();
        if before != after {
            self.metrics.add_watched_files(after as i64 - before as i64);
        }

        if let Some(ref e) = event {
            self.metrics.inc_change_event(&e.kind.to_string());
        }
        event
    }

    async fn apply_inner(&mut self, path: &Path, kind: ChangeKind) -> Option<ChangeEvent> {
        match kind {
            ChangeKind::Created => {
                if path.is_dir() {
                    return None;
                }
                self.cursors.reset(path);
                Some(ChangeEvent::created(path))
            }
            ChangeKind::Deleted => {
                self.cursors.remove(path);
                Some(ChangeEvent::deleted(path))
            }
            ChangeKind::Modified => {
                if !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                if path.is_dir() {
                    return None;
                }

                match self.cursors.read_delta(path).await {
                    Ok(Delta::Appended(bytes)) => Some(ChangeEvent::modified(path, bytes)),
                    Ok(Delta::Unchanged) => {
                        debug!(path = %path.display(), "No new bytes, suppressing event");
                        None
                    }
                    Ok(Delta::Vanished) => {
                        debug!(path = %path.display(), "File vanished before read");
                        Some(ChangeEvent::deleted(path))
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read modified file");
                        self.metrics.inc_read_errors();
                        None
                    }
                }
            }
        }
    }
}

/// Watches one directory tree and emits `ChangeEvent`s
pub struct DirectoryWatcher {
    config: WatcherConfig,
}

impl DirectoryWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self { config }
    }

    /// Start watching. Runs until `shutdown` fires or the returned stream is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(
        self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(WatcherHandle, ReceiverStream<ChangeEvent>), WatchError> {
        let root = self.config.root.clone();
        if !root.exists() {
            return Err(WatchError::PathNotFound(root));
        }
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root));
        }

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            },
            notify::Config::default(),
        )?;

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode)?;
        info!(path = %root.display(), recursive = self.config.recursive, "Watching directory");

        let (out_tx, out_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let mut state = WatchState::new(self.config.settle_delay);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!(path = %root.display(), "Directory watcher shutting down");
                        break;
                    }
                    maybe_event = raw_rx.recv() => {
                        let Some(event) = maybe_event else {
                            debug!("Watcher channel closed");
                            break;
                        };
                        for (path, kind) in classify_event(&event) {
                            if let Some(change) = state.apply(&path, kind).await {
                                if out_tx.send(change).await.is_err() {
                                    debug!(path = %root.display(), "Change receiver dropped");
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok((
            WatcherHandle {
                _watcher: watcher,
                task,
            },
            ReceiverStream::new(out_rx),
        ))
    }
}

/// Handle to a running directory watcher
/// Stops watching when dropped
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the watch loop to exit
    pub async fn stopped(self) {
        let WatcherHandle { _watcher, task } = self;
        let _ = task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::io::Write;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_classify_basic_kinds() {
        let created = classify_event(&event(EventKind::Create(CreateKind::File), &["/w/a"]));
        assert_eq!(created, vec![(PathBuf::from("/w/a"), ChangeKind::Created)]);

        let modified = classify_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/w/a"],
        ));
        assert_eq!(modified, vec![(PathBuf::from("/w/a"), ChangeKind::Modified)]);

        let removed = classify_event(&event(EventKind::Remove(RemoveKind::File), &["/w/a"]));
        assert_eq!(removed, vec![(PathBuf::from("/w/a"), ChangeKind::Deleted)]);
    }

    #[test]
    fn test_classify_renames() {
        let both = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/old", "/w/new"],
        ));
        assert_eq!(
            both,
            vec![
                (PathBuf::from("/w/old"), ChangeKind::Deleted),
                (PathBuf::from("/w/new"), ChangeKind::Created),
            ]
        );

        let from = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/w/old"],
        ));
        assert_eq!(from[0].1, ChangeKind::Deleted);
    }

    #[test]
    fn test_classify_ignores_metadata_and_access() {
        assert!(classify_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/w/a"],
        ))
        .is_empty());
        assert!(classify_event(&event(EventKind::Any, &["/w/a"])).is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_cursor_without_prior_modify() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let mut state = WatchState::new(Duration::ZERO);
        state.apply(&path, ChangeKind::Created).await;
        assert_eq!(state.cursors().offset(&path), Some(0));

        let event = state.apply(&path, ChangeKind::Deleted).await.unwrap();
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert!(event.content.is_none());
        assert!(state.cursors().offset(&path).is_none());
    }

    #[tokio::test]
    async fn test_modify_without_growth_is_suppressed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.txt");
        std::fs::write(&path, b"abc").unwrap();

        let mut state = WatchState::new(Duration::ZERO);
        let first = state.apply(&path, ChangeKind::Modified).await.unwrap();
        assert_eq!(first.content.as_deref(), Some(&b"abc"[..]));

        assert!(state.apply(&path, ChangeKind::Modified).await.is_none());
    }

    #[tokio::test]
    async fn test_truncated_file_is_read_from_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.log");
        std::fs::write(&path, b"first line\n").unwrap();

        let mut state = WatchState::new(Duration::ZERO);
        state.apply(&path, ChangeKind::Modified).await;

        std::fs::write(&path, b"new").unwrap();
        let event = state.apply(&path, ChangeKind::Modified).await.unwrap();
        assert_eq!(event.content.as_deref(), Some(&b"new"[..]));
    }

    #[tokio::test]
    async fn test_vanished_file_reported_as_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.txt");

        let mut state = WatchState::new(Duration::ZERO);
        let event = state.apply(&path, ChangeKind::Modified).await.unwrap();
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert!(event.content.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_error_does_not_stop_later_reads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop.txt");
        let other = dir.path().join("loop-back.txt");
        std::os::unix::fs::symlink(&other, &path).unwrap();
        std::os::unix::fs::symlink(&path, &other).unwrap();

        let mut state = WatchState::new(Duration::ZERO);
        assert!(state.apply(&path, ChangeKind::Modified).await.is_none());
        assert!(state.cursors().offset(&path).is_none());

        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"readable again").unwrap();

        let event = state.apply(&path, ChangeKind::Modified).await.unwrap();
        assert_eq!(event.kind, ChangeKind::Modified);
        assert_eq!(event.content.as_deref(), Some(&b"readable again"[..]));
    }

    #[tokio::test]
    async fn test_directories_are_never_read() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();

        let mut state = WatchState::new(Duration::ZERO);
        assert!(state.apply(&sub, ChangeKind::Created).await.is_none());
        assert!(state.apply(&sub, ChangeKind::Modified).await.is_none());
    }

    #[tokio::test]
    async fn test_watch_rejects_missing_and_non_directory_paths() {
        let dir = TempDir::new().unwrap();
        let (_tx, rx) = broadcast::channel(1);

        let missing = DirectoryWatcher::new(WatcherConfig::new(dir.path().join("nope")));
        assert!(matches!(
            missing.watch(rx.resubscribe()),
            Err(WatchError::PathNotFound(_))
        ));

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"").unwrap();
        let not_dir = DirectoryWatcher::new(WatcherConfig::new(&file));
        assert!(matches!(
            not_dir.watch(rx),
            Err(WatchError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_emits_appended_content() {
        let dir = TempDir::new().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let config = WatcherConfig {
            settle_delay: Duration::from_millis(10),
            ..WatcherConfig::new(dir.path())
        };
        let (handle, mut events) = DirectoryWatcher::new(config).watch(shutdown_rx).unwrap();

        let path = dir.path().join("live.txt");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(b"hello").unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b" world").unwrap();
        }

        let mut content = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while content != b"hello world" {
            let next = tokio::time::timeout_at(deadline, events.next()).await;
            match next {
                Ok(Some(change)) => {
                    if let Some(bytes) = change.content {
                        content.extend(bytes);
                    }
                }
                _ => break,
            }
        }
        assert_eq!(content, b"hello world");

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle.stopped())
            .await
            .unwrap();
    }
}
