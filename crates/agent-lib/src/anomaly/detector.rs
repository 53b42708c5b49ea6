//! Telemetry consumption, alert recording and re-publication

use super::ledger::AlertLedger;
use super::rules::AnomalyRuleEngine;
use crate::error::ChannelError;
use crate::forward::{ChannelMessage, MessageChannel};
use crate::models::{AnomalyAlert, TelemetryRecord};
use crate::observability::{PipelineMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Upper bound on waiting for the alerts topic to acknowledge a publish
pub const DEFAULT_ALERT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

const ALERT_EVENT_TYPE: &str = "ANOMALY_ALERT";

/// Applies the rule engine and records alerts
pub struct AnomalyDetector {
    engine: AnomalyRuleEngine,
    ledger: Arc<AlertLedger>,
    channel: Arc<dyn MessageChannel>,
    alerts_topic: String,
    send_timeout: Duration,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl AnomalyDetector {
    pub fn new(
        ledger: Arc<AlertLedger>,
        channel: Arc<dyn MessageChannel>,
        alerts_topic: impl Into<String>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            engine: AnomalyRuleEngine::new(),
            ledger,
            channel,
            alerts_topic: alerts_topic.into(),
            send_timeout: DEFAULT_ALERT_SEND_TIMEOUT,
            metrics: PipelineMetrics::new(),
            logger,
        }
    }

    /// Bound the wait for each alert publish, same contract as the event forwarder
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn ledger(&self) -> Arc<AlertLedger> {
        self.ledger.clone()
    }

    /// Evaluate one record. An anomaly is inserted into the ledger and
    /// published on the alerts topic keyed by device id.
    ///
    /// A failed or timed out publish is reported and dropped; the alert
    /// stays in the ledger.
    pub async fn process(&self, record: &TelemetryRecord) -> Option<AnomalyAlert> {
        let alert = self.engine.evaluate(record)?;

        self.ledger.insert(alert.clone());
        self.metrics.inc_anomalies_detected();
        self.metrics.set_ledger_size(self.ledger.len() as i64);
        self.logger
            .log_anomaly(&alert.device_id, &alert.description, alert.detected_value);

        if let Err(e) = self.publish(&alert).await {
            self.metrics.inc_forward_failures();
            self.metrics.inc_dropped("delivery");
            self.logger
                .log_forward_failure(&self.alerts_topic, ALERT_EVENT_TYPE, &e.to_string());
            warn!(
                alert_id = %alert.alert_id,
                topic = %self.alerts_topic,
                error = %e,
                "Failed to publish anomaly alert"
            );
        }

        Some(alert)
    }

    async fn publish(&self, alert: &AnomalyAlert) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(alert).map_err(|e| ChannelError::Rejected {
            topic: self.alerts_topic.clone(),
            reason: e.to_string(),
        })?;
        let sent = tokio::time::timeout(
            self.send_timeout,
            self.channel
                .publish(&self.alerts_topic, Some(alert.device_id.as_str()), payload),
        )
        .await;

        match sent {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.send_timeout)),
        }
    }
}

/// Consumes telemetry from a channel subscription and feeds the detector
pub struct DetectorWorker {
    detector: Arc<AnomalyDetector>,
    subscription: broadcast::Receiver<ChannelMessage>,
}

impl DetectorWorker {
    /// Subscribe to `telemetry_topic` on the detector's channel
    pub fn subscribe(
        detector: Arc<AnomalyDetector>,
        telemetry_topic: &str,
    ) -> Result<Self, ChannelError> {
        let subscription = detector.channel.subscribe(telemetry_topic)?;
        Ok(Self {
            detector,
            subscription,
        })
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting anomaly detector worker");

        loop {
            tokio::select! {
                received = self.subscription.recv() => match received {
                    Ok(message) => self.handle(&message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Detector fell behind, telemetry records skipped");
                    }
                    Err(RecvError::Closed) => {
                        info!("Telemetry subscription closed");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down anomaly detector worker");
                    break;
                }
            }
        }
    }

    async fn handle(&self, message: &ChannelMessage) {
        match serde_json::from_str::<TelemetryRecord>(&message.payload) {
            Ok(record) => {
                if self.detector.process(&record).await.is_none() {
                    debug!(device_id = %record.device_id, "Telemetry within limits");
                }
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Discarding malformed telemetry record");
            }
        }
    }
}
