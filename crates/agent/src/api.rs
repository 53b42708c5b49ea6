//! HTTP API for health checks, Prometheus metrics and alert queries

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use edgewatch_lib::{
    anomaly::AnomalyDetector,
    health::HealthRegistry,
    models::{AnomalyAlert, TelemetryRecord},
    observability::PipelineMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub const STATUS_MESSAGE: &str = "Anomaly Detection Service is UP";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
    pub detector: Arc<AnomalyDetector>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: PipelineMetrics,
        detector: Arc<AnomalyDetector>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            detector,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

/// Response to an evaluate request
#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AnomalyAlert>,
}

/// 200 when healthy or degraded, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .metrics
        .set_ledger_size(state.detector.ledger().len() as i64);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn status() -> &'static str {
    STATUS_MESSAGE
}

/// Ledger contents, newest first
async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Json<Vec<AnomalyAlert>> {
    let ledger = state.detector.ledger();
    let alerts = match query.limit {
        Some(limit) => ledger.recent(limit),
        None => ledger.snapshot(),
    };
    Json(alerts)
}

async fn evaluate_telemetry(
    State(state): State<Arc<AppState>>,
    Json(record): Json<TelemetryRecord>,
) -> Json<EvaluateResponse> {
    let alert = state.detector.process(&record).await;
    Json(EvaluateResponse {
        anomaly: alert.is_some(),
        alert,
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/telemetry", post(evaluate_telemetry))
        .with_state(state)
}

/// Serve the API until `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
