//! Event forwarding with synchronous, at-most-once delivery
//!
//! Every envelope is published and the forwarder waits for the channel to
//! acknowledge it, bounded by `send_timeout`. A rejected or timed out
//! envelope is reported and dropped. There is no retry and no local buffer.

use super::channel::MessageChannel;
use super::envelope::Envelope;
use crate::error::{ChannelError, ForwardError};
use crate::models::{ChangeEvent, LogEvent};
use crate::observability::{PipelineMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

/// Configuration for the event forwarder
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Identity stamped on every envelope
    pub device_id: String,
    /// Topic envelopes are published to
    pub topic: String,
    /// Upper bound on waiting for an acknowledgement
    pub send_timeout: Duration,
    /// File extensions (without the dot) whose changes are forwarded. Empty forwards all.
    pub extensions: Vec<String>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            device_id: "WS-AGENT".to_string(),
            topic: "device-events-workstation".to_string(),
            send_timeout: Duration::from_secs(5),
            extensions: Vec::new(),
        }
    }
}

/// Any event the forwarder can package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Change(ChangeEvent),
    Log(LogEvent),
}

impl From<ChangeEvent> for PipelineEvent {
    fn from(event: ChangeEvent) -> Self {
        PipelineEvent::Change(event)
    }
}

impl From<LogEvent> for PipelineEvent {
    fn from(event: LogEvent) -> Self {
        PipelineEvent::Log(event)
    }
}

/// What happened to an event that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Channel acknowledged the envelope
    Delivered,
    /// Modification with no new bytes
    SkippedEmpty,
    /// File extension not in the allow list
    SkippedFiltered,
}

/// Statistics for forwarding operations
#[derive(Debug, Default, Clone)]
pub struct ForwardStats {
    pub forwarded: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Packages events into envelopes and publishes them
pub struct EventForwarder {
    channel: Arc<dyn MessageChannel>,
    config: ForwarderConfig,
    stats: Arc<RwLock<ForwardStats>>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl EventForwarder {
    pub fn new(channel: Arc<dyn MessageChannel>, config: ForwarderConfig) -> Self {
        let logger = StructuredLogger::new(config.device_id.clone());
        Self {
            channel,
            config,
            stats: Arc::new(RwLock::new(ForwardStats::default())),
            metrics: PipelineMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Current forwarding statistics
    pub async fn stats(&self) -> ForwardStats {
        self.stats.read().await.clone()
    }

    /// Shared handle to the statistics
    pub fn stats_handle(&self) -> Arc<RwLock<ForwardStats>> {
        self.stats.clone()
    }

    /// Deliver one event's envelope to the channel
    pub async fn forward(&self, event: impl Into<PipelineEvent>) -> Result<ForwardOutcome, ForwardError> {
        match event.into() {
            PipelineEvent::Change(change) => self.forward_change(&change).await,
            PipelineEvent::Log(log) => self.forward_log(&log).await,
        }
    }

    pub async fn forward_change(&self, event: &ChangeEvent) -> Result<ForwardOutcome, ForwardError> {
        if event.is_empty_modification() {
            self.record_skip("empty").await;
            return Ok(ForwardOutcome::SkippedEmpty);
        }
        if !self.extension_allowed(event) {
            debug!(path = %event.path.display(), "Extension filtered, not forwarding");
            self.record_skip("filtered").await;
            return Ok(ForwardOutcome::SkippedFiltered);
        }

        let envelope = match Envelope::from_change(&self.config.device_id, event) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.record_drop("serialization", &e).await;
                return Err(e);
            }
        };
        self.deliver(envelope).await
    }

    pub async fn forward_log(&self, event: &LogEvent) -> Result<ForwardOutcome, ForwardError> {
        self.deliver(Envelope::from_log(&self.config.device_id, event))
            .await
    }

    fn extension_allowed(&self, event: &ChangeEvent) -> bool {
        if self.config.extensions.is_empty() {
            return true;
        }
        let Some(ext) = event.path.extension().map(|e| e.to_string_lossy()) else {
            return false;
        };
        self.config
            .extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    async fn deliver(&self, envelope: Envelope) -> Result<ForwardOutcome, ForwardError> {
        let event_type = envelope.event_type();
        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                self.record_drop("serialization", &e).await;
                return Err(e);
            }
        };

        let start = Instant::now();
        let sent = tokio::time::timeout(
            self.config.send_timeout,
            self.channel
                .publish(&self.config.topic, Some(self.config.device_id.as_str()), payload),
        )
        .await;
        self.metrics
            .observe_forward_latency(start.elapsed().as_secs_f64());

        let result = match sent {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.config.send_timeout)),
        };

        match result {
            Ok(()) => {
                self.metrics.inc_forwarded(event_type);
                self.stats.write().await.forwarded += 1;
                Ok(ForwardOutcome::Delivered)
            }
            Err(e) => {
                let err = ForwardError::Delivery(e);
                self.metrics.inc_forward_failures();
                self.stats.write().await.failures += 1;
                self.logger
                    .log_forward_failure(&self.config.topic, event_type, &err.to_string());
                self.record_drop("delivery", &err).await;
                Err(err)
            }
        }
    }

    async fn record_skip(&self, reason: &str) {
        self.metrics.inc_dropped(reason);
        self.stats.write().await.skipped += 1;
    }

    async fn record_drop(&self, reason: &str, err: &ForwardError) {
        self.metrics.inc_dropped(reason);
        let mut stats = self.stats.write().await;
        stats.dropped += 1;
        stats.last_error = Some(err.to_string());
    }
}

/// Drains an event stream into the forwarder until shutdown
pub struct ForwardingWorker {
    forwarder: Arc<EventForwarder>,
}

impl ForwardingWorker {
    pub fn new(forwarder: Arc<EventForwarder>) -> Self {
        Self { forwarder }
    }

    /// Forward events in arrival order. Failures are already reported by the
    /// forwarder, so the loop just moves on.
    pub async fn run<S>(self, mut events: S, mut shutdown: broadcast::Receiver<()>)
    where
        S: Stream<Item = PipelineEvent> + Unpin,
    {
        info!(topic = %self.forwarder.config().topic, "Starting forwarding worker");

        loop {
            tokio::select! {
                maybe_event = events.next() => {
                    let Some(event) = maybe_event else {
                        info!("Event sources closed, forwarding worker exiting");
                        break;
                    };
                    if let Err(e) = self.forwarder.forward(event).await {
                        debug!(error = %e, "Event dropped");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down forwarding worker");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::channel::{ChannelMessage, InMemoryChannel};
    use crate::models::Severity;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::PathBuf;

    /// Channel that rejects every message
    struct RejectingChannel;

    #[async_trait]
    impl MessageChannel for RejectingChannel {
        async fn publish(
            &self,
            topic: &str,
            _key: Option<&str>,
            _payload: String,
        ) -> Result<(), ChannelError> {
            Err(ChannelError::Rejected {
                topic: topic.to_string(),
                reason: "broker full".to_string(),
            })
        }

        fn subscribe(
            &self,
            topic: &str,
        ) -> Result<broadcast::Receiver<ChannelMessage>, ChannelError> {
            Err(ChannelError::Unavailable(topic.to_string()))
        }
    }

    /// Channel that never acknowledges
    struct StalledChannel;

    #[async_trait]
    impl MessageChannel for StalledChannel {
        async fn publish(
            &self,
            _topic: &str,
            _key: Option<&str>,
            _payload: String,
        ) -> Result<(), ChannelError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn subscribe(
            &self,
            topic: &str,
        ) -> Result<broadcast::Receiver<ChannelMessage>, ChannelError> {
            Err(ChannelError::Unavailable(topic.to_string()))
        }
    }

    fn log_event(line: &str) -> LogEvent {
        LogEvent {
            source_file: PathBuf::from("/var/log/syslog"),
            line: line.to_string(),
            severity: Severity::Warn,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_forward_log_publishes_envelope() {
        let channel = Arc::new(InMemoryChannel::default());
        let mut rx = channel.subscribe("events").unwrap();
        let forwarder = EventForwarder::new(
            channel.clone(),
            ForwarderConfig {
                topic: "events".to_string(),
                ..Default::default()
            },
        );

        let outcome = forwarder.forward(log_event("disk warning")).await.unwrap();
        assert_eq!(outcome, ForwardOutcome::Delivered);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.key.as_deref(), Some("WS-AGENT"));
        let value: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(value["eventType"], "LOG_ENTRY");
        assert_eq!(value["logLine"], "disk warning");
        assert_eq!(forwarder.stats().await.forwarded, 1);
    }

    #[tokio::test]
    async fn test_empty_modification_is_not_forwarded() {
        let channel = Arc::new(InMemoryChannel::default());
        let mut rx = channel.subscribe("device-events-workstation").unwrap();
        let forwarder = EventForwarder::new(channel.clone(), ForwarderConfig::default());

        let outcome = forwarder
            .forward(ChangeEvent::modified("/w/a.txt", Vec::new()))
            .await
            .unwrap();

        assert_eq!(outcome, ForwardOutcome::SkippedEmpty);
        assert!(rx.try_recv().is_err());
        assert_eq!(forwarder.stats().await.skipped, 1);
    }

    #[tokio::test]
    async fn test_extension_filter() {
        let channel = Arc::new(InMemoryChannel::default());
        let forwarder = EventForwarder::new(
            channel,
            ForwarderConfig {
                extensions: vec![".txt".to_string(), "log".to_string()],
                ..Default::default()
            },
        );

        let txt = forwarder
            .forward(ChangeEvent::modified("/w/notes.TXT", b"x".to_vec()))
            .await
            .unwrap();
        let bin = forwarder
            .forward(ChangeEvent::modified("/w/image.png", b"x".to_vec()))
            .await
            .unwrap();
        let bare = forwarder
            .forward(ChangeEvent::created("/w/Makefile"))
            .await
            .unwrap();

        assert_eq!(txt, ForwardOutcome::Delivered);
        assert_eq!(bin, ForwardOutcome::SkippedFiltered);
        assert_eq!(bare, ForwardOutcome::SkippedFiltered);
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_dropped() {
        let forwarder = EventForwarder::new(Arc::new(RejectingChannel), ForwarderConfig::default());

        let err = forwarder.forward(log_event("x")).await.unwrap_err();
        assert!(matches!(
            err,
            ForwardError::Delivery(ChannelError::Rejected { .. })
        ));

        let stats = forwarder.stats().await;
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.forwarded, 0);
        assert!(stats.last_error.unwrap().contains("broker full"));
    }

    #[tokio::test]
    async fn test_unavailable_channel_drops_without_retry() {
        let channel = Arc::new(InMemoryChannel::default());
        let mut rx = channel.subscribe("device-events-workstation").unwrap();
        let forwarder = EventForwarder::new(channel.clone(), ForwarderConfig::default());

        channel.close();
        assert!(forwarder.forward(log_event("lost")).await.is_err());
        channel.reopen();
        forwarder.forward(log_event("kept")).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert!(msg.payload.contains("kept"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_timeout() {
        let forwarder = EventForwarder::new(
            Arc::new(StalledChannel),
            ForwarderConfig {
                send_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let err = forwarder.forward(log_event("slow")).await.unwrap_err();
        assert_eq!(
            err,
            ForwardError::Delivery(ChannelError::Timeout(Duration::from_millis(20)))
        );
    }

    #[tokio::test]
    async fn test_non_utf8_change_is_dropped() {
        let channel = Arc::new(InMemoryChannel::default());
        let forwarder = EventForwarder::new(channel, ForwarderConfig::default());

        let err = forwarder
            .forward(ChangeEvent::modified("/w/blob.bin", vec![0xc3, 0x28]))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Serialization(_)));
        assert_eq!(forwarder.stats().await.dropped, 1);
    }

    #[tokio::test]
    async fn test_worker_forwards_until_stream_ends() {
        let channel = Arc::new(InMemoryChannel::default());
        let mut rx = channel.subscribe("device-events-workstation").unwrap();
        let forwarder = Arc::new(EventForwarder::new(channel.clone(), ForwarderConfig::default()));

        let events = tokio_stream::iter(vec![
            PipelineEvent::from(ChangeEvent::created("/w/a.txt")),
            PipelineEvent::from(log_event("one")),
        ]);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        ForwardingWorker::new(forwarder.clone())
            .run(events, shutdown_rx)
            .await;

        assert!(rx.recv().await.unwrap().payload.contains("FILE_CHANGED"));
        assert!(rx.recv().await.unwrap().payload.contains("LOG_ENTRY"));
        assert_eq!(forwarder.stats().await.forwarded, 2);
    }
}
