//! Observability infrastructure for the edge agent
//!
//! Provides:
//! - Prometheus metrics (event counts, forward latency, ledger size, watched files)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for channel send latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    change_events: IntCounterVec,
    log_events: IntCounterVec,
    envelopes_forwarded: IntCounterVec,
    forward_failures: IntCounter,
    envelopes_dropped: IntCounterVec,
    read_errors: IntCounter,
    anomalies_detected: IntCounter,
    ledger_size: IntGauge,
    watched_files: IntGauge,
    forward_latency_seconds: Histogram,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            change_events: register_int_counter_vec!(
                "edgewatch_change_events_total",
                "File change events emitted by directory watchers",
                &["kind"]
            )
            .expect("Failed to register change_events_total"),

            log_events: register_int_counter_vec!(
                "edgewatch_log_events_total",
                "Log lines emitted by tailers",
                &["severity"]
            )
            .expect("Failed to register log_events_total"),

            envelopes_forwarded: register_int_counter_vec!(
                "edgewatch_envelopes_forwarded_total",
                "Envelopes acknowledged by the message channel",
                &["event_type"]
            )
            .expect("Failed to register envelopes_forwarded_total"),

            forward_failures: register_int_counter!(
                "edgewatch_forward_failures_total",
                "Envelopes rejected by or timed out on the message channel"
            )
            .expect("Failed to register forward_failures_total"),

            envelopes_dropped: register_int_counter_vec!(
                "edgewatch_envelopes_dropped_total",
                "Events dropped before or during delivery",
                &["reason"]
            )
            .expect("Failed to register envelopes_dropped_total"),

            read_errors: register_int_counter!(
                "edgewatch_read_errors_total",
                "Transient read failures on watched or tailed files"
            )
            .expect("Failed to register read_errors_total"),

            anomalies_detected: register_int_counter!(
                "edgewatch_anomalies_detected_total",
                "Telemetry records that produced an anomaly alert"
            )
            .expect("Failed to register anomalies_detected_total"),

            ledger_size: register_int_gauge!(
                "edgewatch_ledger_size",
                "Alerts currently held in the alert ledger"
            )
            .expect("Failed to register ledger_size"),

            watched_files: register_int_gauge!(
                "edgewatch_watched_files",
                "Files with an active read cursor"
            )
            .expect("Failed to register watched_files"),

            forward_latency_seconds: register_histogram!(
                "edgewatch_forward_latency_seconds",
                "Time spent waiting for the message channel to acknowledge an envelope",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register forward_latency_seconds"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance. Clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn inc_change_event(&self, kind: &str) {
        self.inner().change_events.with_label_values(&[kind]).inc();
    }

    pub fn inc_log_event(&self, severity: &str) {
        self.inner().log_events.with_label_values(&[severity]).inc();
    }

    pub fn inc_forwarded(&self, event_type: &str) {
        self.inner()
            .envelopes_forwarded
            .with_label_values(&[event_type])
            .inc();
    }

    pub fn inc_forward_failures(&self) {
        self.inner().forward_failures.inc();
    }

    /// `reason` is one of `filtered`, `empty`, `serialization`, `delivery`
    pub fn inc_dropped(&self, reason: &str) {
        self.inner()
            .envelopes_dropped
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_read_errors(&self) {
        self.inner().read_errors.inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn set_ledger_size(&self, size: i64) {
        self.inner().ledger_size.set(size);
    }

    pub fn add_watched_files(&self, delta: i64) {
        self.inner().watched_files.add(delta);
    }

    pub fn observe_forward_latency(&self, duration_secs: f64) {
        self.inner().forward_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for pipeline events
///
/// Every record carries an `event` tag and the node identity so log
/// pipelines can filter on them.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log an anomaly detection event
    pub fn log_anomaly(&self, device_id: &str, description: &str, detected_value: f64) {
        warn!(
            event = "anomaly_detected",
            node = %self.node_name,
            device_id = %device_id,
            detected_value = detected_value,
            description = %description,
            "Anomaly detected"
        );
    }

    /// Log a message that could not be delivered and was dropped
    pub fn log_forward_failure(&self, topic: &str, event_type: &str, error: &str) {
        warn!(
            event = "forward_failed",
            node = %self.node_name,
            topic = %topic,
            event_type = %event_type,
            error = %error,
            "Envelope dropped after delivery failure"
        );
    }

    /// Log a watch or tail source that will not be started
    pub fn log_source_skipped(&self, source: &str, path: &str, reason: &str) {
        warn!(
            event = "source_skipped",
            node = %self.node_name,
            source = %source,
            path = %path,
            reason = %reason,
            "Source not started"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, watched_dirs: usize, tailed_files: usize) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            watched_dirs = watched_dirs,
            tailed_files = tailed_files,
            "Edge agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Edge agent shutting down"
        );
    }
}
