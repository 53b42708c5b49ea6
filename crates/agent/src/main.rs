//! Edge agent - watches files, tails logs, forwards events and detects anomalies
//!
//! Runs on each edge node. Every watched directory and tailed file gets its
//! own task; all of them stop on SIGINT.

use anyhow::{Context, Result};
use edgewatch_agent::{api, config::AgentConfig};
use edgewatch_lib::{
    anomaly::{AlertLedger, AnomalyDetector, DetectorWorker},
    collector::{DirectoryWatcher, LogTailer},
    forward::{EventForwarder, ForwardingWorker, InMemoryChannel, MessageChannel, PipelineEvent},
    health::{components, HealthRegistry},
    observability::{PipelineMetrics, StructuredLogger},
};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Grace period for loops to observe the shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type EventStream = Pin<Box<dyn Stream<Item = PipelineEvent> + Send>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting edgewatch-agent");

    let config = AgentConfig::load().context("Failed to load agent configuration")?;
    info!(node_name = %config.node_name, device_id = %config.device_id, "Agent configured");

    let health_registry = HealthRegistry::new();
    for component in [
        components::WATCHER,
        components::TAILER,
        components::FORWARDER,
        components::DETECTOR,
    ] {
        health_registry.register(component).await;
    }

    let metrics = PipelineMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let channel = Arc::new(InMemoryChannel::default());
    let channel_dyn: Arc<dyn MessageChannel> = channel.clone();

    // Anomaly detection
    let ledger = Arc::new(AlertLedger::new(config.ledger_capacity));
    let detector = Arc::new(AnomalyDetector::new(
        ledger,
        channel_dyn.clone(),
        config.alerts_topic.clone(),
        logger.clone(),
    )
    .with_send_timeout(config.send_timeout()));
    let detector_task = match DetectorWorker::subscribe(detector.clone(), &config.telemetry_topic) {
        Ok(worker) => Some(tokio::spawn(worker.run(shutdown_tx.subscribe()))),
        Err(e) => {
            warn!(error = %e, topic = %config.telemetry_topic, "Cannot subscribe to telemetry");
            health_registry
                .set_unhealthy(components::DETECTOR, e.to_string())
                .await;
            None
        }
    };

    // Directory watcher
    let mut watcher_handle = None;
    let mut change_stream = None;
    match config.watcher_config() {
        Some(watcher_config) => {
            let root = watcher_config.root.clone();
            match DirectoryWatcher::new(watcher_config).watch(shutdown_tx.subscribe()) {
                Ok((handle, stream)) => {
                    watcher_handle = Some(handle);
                    change_stream = Some(stream);
                }
                Err(e) => {
                    logger.log_source_skipped("watcher", &root.to_string_lossy(), &e.to_string());
                    health_registry
                        .set_unhealthy(components::WATCHER, e.to_string())
                        .await;
                }
            }
        }
        None => info!("No watch path configured, directory watcher disabled"),
    }

    // Log tailers
    let (tailer_handle, log_stream) = LogTailer::new(config.tailer_config())
        .tail(shutdown_tx.subscribe())
        .await;
    for (path, reason) in tailer_handle.skipped() {
        logger.log_source_skipped("tailer", &path.to_string_lossy(), reason);
    }
    if !tailer_handle.skipped().is_empty() {
        health_registry
            .set_degraded(
                components::TAILER,
                format!("{} log file(s) skipped", tailer_handle.skipped().len()),
            )
            .await;
    }

    // Forwarding
    let events: EventStream = match change_stream {
        Some(changes) => Box::pin(
            changes
                .map(PipelineEvent::from)
                .merge(log_stream.map(PipelineEvent::from)),
        ),
        None => Box::pin(log_stream.map(PipelineEvent::from)),
    };
    let forwarder = Arc::new(EventForwarder::new(channel_dyn, config.forwarder_config()));
    let forward_task = tokio::spawn(
        ForwardingWorker::new(forwarder.clone()).run(events, shutdown_tx.subscribe()),
    );

    logger.log_startup(
        AGENT_VERSION,
        usize::from(watcher_handle.is_some()),
        tailer_handle.active(),
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        detector,
    ));
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    let drain = async {
        if let Some(handle) = watcher_handle {
            handle.stopped().await;
        }
        tailer_handle.stopped().await;
        let _ = forward_task.await;
        if let Some(task) = detector_task {
            let _ = task.await;
        }
        match api_handle.await {
            Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
            Err(e) => warn!(error = %e, "API server task failed"),
            Ok(Ok(())) => {}
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Timed out waiting for tasks to stop");
    }

    let stats = forwarder.stats().await;
    info!(
        forwarded = stats.forwarded,
        dropped = stats.dropped,
        failures = stats.failures,
        open_topics = channel.topics().len(),
        "Shutdown complete"
    );

    Ok(())
}
