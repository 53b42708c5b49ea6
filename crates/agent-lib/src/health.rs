//! Component health tracking for the edge agent
//!
//! Each pipeline stage reports its own status; the agent's liveness and
//! readiness probes are derived from the combined view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered from best to worst, so the combined status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Running with reduced coverage, e.g. some log files skipped
    Degraded,
    /// Not running
    Unhealthy,
}

impl ComponentStatus {
    /// Liveness holds unless a stage is down
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn now(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::now(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::now(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::now(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of the liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst component status; an empty set is healthy
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Body of the readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadinessResponse {
    fn not_ready(reason: &str) -> Self {
        Self {
            ready: false,
            reason: Some(reason.to_string()),
        }
    }
}

pub mod components {
    pub const WATCHER: &str = "watcher";
    pub const TAILER: &str = "tailer";
    pub const FORWARDER: &str = "forwarder";
    pub const DETECTOR: &str = "detector";
}

/// Cloneable handle shared by the pipeline stages and the HTTP probes
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    stages: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    wired: Arc<AtomicBool>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `name` as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentHealth::unhealthy(message)).await;
    }

    async fn set(&self, name: &str, health: ComponentHealth) {
        self.stages.write().await.insert(name.to_string(), health);
    }

    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.stages.read().await.get(name).cloned()
    }

    /// Flip once every stage has been started, and back during shutdown
    pub async fn set_ready(&self, ready: bool) {
        self.wired.store(ready, Ordering::SeqCst);
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.stages.read().await.clone();
        HealthResponse {
            status: HealthResponse::compute_status(&components),
            components,
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !self.wired.load(Ordering::SeqCst) {
            return ReadinessResponse::not_ready("Agent not yet initialized");
        }
        if self.health().await.status == ComponentStatus::Unhealthy {
            return ReadinessResponse::not_ready("Pipeline component unhealthy");
        }
        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}
