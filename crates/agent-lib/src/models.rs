//! Core data models for the telemetry pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Kind of change observed on a watched path
///
/// Decided once when the OS notification is translated, never re-derived later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "CREATED"),
            ChangeKind::Modified => write!(f, "MODIFIED"),
            ChangeKind::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A change on a file inside a watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Bytes appended since the last cursor position. Only set for `Modified`.
    pub content: Option<Vec<u8>>,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::without_content(path, ChangeKind::Created)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::without_content(path, ChangeKind::Deleted)
    }

    pub fn modified(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
            content: Some(content),
            observed_at: Utc::now(),
        }
    }

    fn without_content(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            content: None,
            observed_at: Utc::now(),
        }
    }

    /// True when a `Modified` event carries nothing new and must not be forwarded
    pub fn is_empty_modification(&self) -> bool {
        self.kind == ChangeKind::Modified
            && self.content.as_ref().map_or(true, |bytes| bytes.is_empty())
    }

    /// File name component of the path, used in the wire envelope
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Severity of a tailed log line, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One newline-terminated line read from a tailed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub source_file: PathBuf,
    pub line: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Reported device status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Telemetry reading consumed by the anomaly rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub device_id: String,
    pub status: DeviceStatus,
    #[serde(alias = "temperature")]
    pub reading: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Alert raised for an anomalous telemetry record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyAlert {
    pub alert_id: Uuid,
    pub device_id: String,
    pub description: String,
    pub detected_value: f64,
    pub timestamp: DateTime<Utc>,
}
