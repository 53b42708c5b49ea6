//! Domain errors for watching, tailing and forwarding

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures while setting up or running a directory watch
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("notify backend error: {0}")]
    Notify(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a message channel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel unavailable for topic {0}")]
    Unavailable(String),

    #[error("topic {topic} rejected message: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures while turning an event into an envelope and delivering it
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForwardError {
    #[error("failed to build envelope: {0}")]
    Serialization(String),

    #[error("delivery failed: {0}")]
    Delivery(#[from] ChannelError),
}

impl From<serde_json::Error> for ForwardError {
    fn from(err: serde_json::Error) -> Self {
        ForwardError::Serialization(err.to_string())
    }
}
