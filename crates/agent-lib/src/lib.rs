//! Edge telemetry pipeline
//!
//! This crate provides the core functionality for:
//! - Watching directories and reading only newly appended bytes
//! - Tailing log files with severity classification
//! - Forwarding events as flat JSON envelopes to a message channel
//! - Rule-based anomaly detection with a bounded alert ledger
//! - Health checks and observability

pub mod anomaly;
pub mod collector;
pub mod error;
pub mod forward;
pub mod health;
pub mod models;
pub mod observability;

pub use error::{ChannelError, ForwardError, WatchError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
