//! Flat JSON wire envelope for forwarded events
//!
//! Free-text fields are escaped by serde_json, which covers backslash,
//! quote and all control characters.

use crate::error::ForwardError;
use crate::models::{ChangeEvent, ChangeKind, LogEvent};
use serde::{Deserialize, Serialize};

/// Severity label carried by file change envelopes
pub const FILE_CHANGE_SEVERITY: &str = "LOW";

/// Type-specific envelope fields, tagged by `eventType`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeBody {
    #[serde(rename_all = "camelCase")]
    FileChanged {
        filename: String,
        change_type: ChangeKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LogEntry { log_file: String, log_line: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub body: EnvelopeBody,
    pub device_id: String,
    pub severity: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Envelope {
    /// Package a file change
    ///
    /// Content that is not valid UTF-8 cannot be carried in the envelope and
    /// yields `ForwardError::Serialization`.
    pub fn from_change(device_id: &str, event: &ChangeEvent) -> Result<Self, ForwardError> {
        let content = match &event.content {
            Some(bytes) => Some(String::from_utf8(bytes.clone()).map_err(|_| {
                ForwardError::Serialization(format!(
                    "content of {} is not valid UTF-8",
                    event.path.display()
                ))
            })?),
            None => None,
        };

        Ok(Self {
            body: EnvelopeBody::FileChanged {
                filename: event.file_name(),
                change_type: event.kind,
                content,
            },
            device_id: device_id.to_string(),
            severity: FILE_CHANGE_SEVERITY.to_string(),
            timestamp: event.observed_at.timestamp_millis(),
        })
    }

    /// Package a tailed log line
    pub fn from_log(device_id: &str, event: &LogEvent) -> Self {
        Self {
            body: EnvelopeBody::LogEntry {
                log_file: event.source_file.to_string_lossy().into_owned(),
                log_line: event.line.clone(),
            },
            device_id: device_id.to_string(),
            severity: event.severity.to_string(),
            timestamp: event.timestamp.timestamp_millis(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.body {
            EnvelopeBody::FileChanged { .. } => "FILE_CHANGED",
            EnvelopeBody::LogEntry { .. } => "LOG_ENTRY",
        }
    }

    pub fn to_json(&self) -> Result<String, ForwardError> {
        Ok(serde_json::to_string(self)?)
    }
}
