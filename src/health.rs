//! Probe endpoints and Prometheus metrics.
//!
//! Provides:
//! - `/` and `/health` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the topic is provisioned)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;

use crate::webhooks::policies::DropReason;

/// Labels for dropped-event metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DropLabels {
    pub reason: String,
}

/// Labels for missing-field metrics (dotted payload path)
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FieldLabels {
    pub path: String,
}

/// Shared metrics for the webhook pipeline
pub struct Metrics {
    /// Admission calls received
    pub admission_requests_total: Counter,
    /// Bodies that could not be read or parsed as an admission review
    pub parse_errors_total: Counter,
    /// Leaf fields that were absent and defaulted
    pub missing_fields_total: Family<FieldLabels, Counter>,
    /// Events dropped by policy
    pub events_dropped_total: Family<DropLabels, Counter>,
    /// Events acknowledged by the broker
    pub events_published_total: Counter,
    /// Publishes that failed or timed out
    pub publish_errors_total: Counter,
    /// Time from publish to acknowledgment
    pub publish_duration_seconds: Histogram,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Counter::default();
        registry.register(
            "kadvice_admission_requests",
            "Total number of admission webhook calls received",
            admission_requests_total.clone(),
        );

        let parse_errors_total = Counter::default();
        registry.register(
            "kadvice_parse_errors",
            "Total number of payloads that were not admission reviews",
            parse_errors_total.clone(),
        );

        let missing_fields_total = Family::<FieldLabels, Counter>::default();
        registry.register(
            "kadvice_missing_fields",
            "Total number of payload fields that were missing and defaulted",
            missing_fields_total.clone(),
        );

        let events_dropped_total = Family::<DropLabels, Counter>::default();
        registry.register(
            "kadvice_events_dropped",
            "Total number of events dropped by policy",
            events_dropped_total.clone(),
        );

        let events_published_total = Counter::default();
        registry.register(
            "kadvice_events_published",
            "Total number of events acknowledged by the broker",
            events_published_total.clone(),
        );

        let publish_errors_total = Counter::default();
        registry.register(
            "kadvice_publish_errors",
            "Total number of failed publishes",
            publish_errors_total.clone(),
        );

        let publish_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "kadvice_publish_duration_seconds",
            "Time spent waiting for broker acknowledgment in seconds",
            publish_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            parse_errors_total,
            missing_fields_total,
            events_dropped_total,
            events_published_total,
            publish_errors_total,
            publish_duration_seconds,
            registry,
        }
    }

    /// Record an incoming admission call
    pub fn record_request(&self) {
        self.admission_requests_total.inc();
    }

    /// Record an unparsable payload
    pub fn record_parse_error(&self) {
        self.parse_errors_total.inc();
    }

    /// Record fields that were defaulted
    pub fn record_missing_fields(&self, paths: &[&str]) {
        for path in paths {
            self.missing_fields_total
                .get_or_create(&FieldLabels {
                    path: (*path).to_string(),
                })
                .inc();
        }
    }

    /// Record an event dropped by policy
    pub fn record_drop(&self, reason: DropReason) {
        self.events_dropped_total
            .get_or_create(&DropLabels {
                reason: reason.as_str().to_string(),
            })
            .inc();
    }

    /// Record a publish attempt and how long it took
    pub fn record_publish(&self, success: bool, duration_secs: f64) {
        self.publish_duration_seconds.observe(duration_secs);
        if success {
            self.events_published_total.inc();
        } else {
            self.publish_errors_total.inc();
        }
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the probe endpoints
pub struct HealthState {
    /// Whether the service is ready (topic provisioned, not shutting down)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the service as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the service is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the topic is provisioned and again
/// once shutdown starts.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the probe router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(healthz))
        .route("/health", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
