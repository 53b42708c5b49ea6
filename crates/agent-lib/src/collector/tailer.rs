//! Log file tailing
//!
//! Each configured file gets its own polling task. Tailing starts at the end
//! of the file; content present at startup is never replayed.

use super::severity::{SeverityClassifier, SeverityKeywords};
use crate::models::LogEvent;
use crate::observability::PipelineMetrics;
use anyhow::Result;
use chrono::Utc;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Configuration for the log tailer
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Files to tail
    pub files: Vec<PathBuf>,
    /// Time between length checks (default: 1 second)
    pub poll_interval: Duration,
    /// Keyword lists for severity classification
    pub keywords: SeverityKeywords,
    /// Channel buffer size for emitted log events
    pub buffer_size: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            files: vec![
                PathBuf::from("/var/log/syslog"),
                PathBuf::from("/var/log/auth.log"),
            ],
            poll_interval: Duration::from_secs(1),
            keywords: SeverityKeywords::default(),
            buffer_size: 1000,
        }
    }
}

/// Read position within one tailed file
#[derive(Debug, Clone)]
pub struct TailCursor {
    path: PathBuf,
    offset: u64,
}

impl TailCursor {
    /// Open `path` and position the cursor at its current end
    pub async fn open_at_end(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = tokio::fs::File::open(&path).await?;
        let offset = file.metadata().await?.len();
        Ok(Self { path, offset })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read complete lines appended since the previous poll
    ///
    /// A trailing fragment without a newline stays unread until it is
    /// completed. A file shorter than the offset resets the cursor to 0 and
    /// yields nothing this round.
    pub async fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let len = tokio::fs::metadata(&self.path).await?.len();

        if len < self.offset {
            debug!(path = %self.path.display(), offset = self.offset, len, "Log truncated or rotated");
            self.offset = 0;
            return Ok(Vec::new());
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.take(len - self.offset).read_to_end(&mut buf).await?;

        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };

        let complete = &buf[..last_newline];
        self.offset += last_newline as u64 + 1;

        Ok(complete
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect())
    }
}

/// Tails a list of log files and emits one `LogEvent` per line
pub struct LogTailer {
    config: TailerConfig,
    classifier: Arc<SeverityClassifier>,
}

impl LogTailer {
    pub fn new(config: TailerConfig) -> Self {
        let classifier = Arc::new(SeverityClassifier::new(config.keywords.clone()));
        Self { config, classifier }
    }

    /// Start one polling task per readable file
    ///
    /// Files that cannot be opened are skipped and listed in the handle.
    pub async fn tail(
        self,
        shutdown: broadcast::Receiver<()>,
    ) -> (TailerHandle, ReceiverStream<LogEvent>) {
        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        let mut tasks = Vec::new();
        let mut skipped = Vec::new();

        for path in &self.config.files {
            match TailCursor::open_at_end(path).await {
                Ok(cursor) => {
                    info!(path = %path.display(), offset = cursor.offset(), "Tailing log file");
                    let task = tokio::spawn(run_tail(
                        cursor,
                        self.config.poll_interval,
                        self.classifier.clone(),
                        tx.clone(),
                        shutdown.resubscribe(),
                    ));
                    tasks.push(task);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot open log file, not tailing it");
                    skipped.push((path.clone(), e.to_string()));
                }
            }
        }

        (TailerHandle { tasks, skipped }, ReceiverStream::new(rx))
    }
}

async fn run_tail(
    mut cursor: TailCursor,
    poll_interval: Duration,
    classifier: Arc<SeverityClassifier>,
    tx: mpsc::Sender<LogEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let metrics = PipelineMetrics::new();
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let lines = match cursor.poll().await {
                    Ok(lines) => lines,
                    Err(e) => {
                        warn!(path = %cursor.path().display(), error = %e, "Failed to poll log file");
                        metrics.inc_read_errors();
                        continue;
                    }
                };

                for line in lines {
                    let severity = classifier.classify(&line);
                    metrics.inc_log_event(severity.as_str());
                    let event = LogEvent {
                        source_file: cursor.path().to_path_buf(),
                        line,
                        severity,
                        timestamp: Utc::now(),
                    };
                    if tx.send(event).await.is_err() {
                        debug!(path = %cursor.path().display(), "Log event receiver dropped");
                        return;
                    }
                }
            }
            _ = shutdown.recv() => {
                info!(path = %cursor.path().display(), "Shutting down log tailer");
                break;
            }
        }
    }
}

/// Handle to the running tail tasks
pub struct TailerHandle {
    tasks: Vec<tokio::task::JoinHandle<()>>,
    skipped: Vec<(PathBuf, String)>,
}

impl TailerHandle {
    /// Number of files being tailed
    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Files that could not be opened at startup, with the reason
    pub fn skipped(&self) -> &[(PathBuf, String)] {
        &self.skipped
    }

    /// Wait for every tail task to exit
    pub async fn stopped(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Builder for creating a log tailer
pub struct LogTailerBuilder {
    config: TailerConfig,
}

impl LogTailerBuilder {
    pub fn new() -> Self {
        Self {
            config: TailerConfig {
                files: Vec::new(),
                ..TailerConfig::default()
            },
        }
    }

    /// Add a file to tail
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.files.push(path.into());
        self
    }

    /// Replace the file list
    pub fn files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config.files = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn keywords(mut self, keywords: SeverityKeywords) -> Self {
        self.config.keywords = keywords;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn build(self) -> Result<LogTailer> {
        if self.config.files.is_empty() {
            return Err(anyhow::anyhow!("At least one log file is required"));
        }
        if self.config.poll_interval.is_zero() {
            return Err(anyhow::anyhow!("Poll interval must be non-zero"));
        }
        Ok(LogTailer::new(self.config))
    }
}

impl Default for LogTailerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
