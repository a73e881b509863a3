//! Admission webhook server.
//!
//! Every `POST /{project}/{cluster}` call is answered with
//! `{"response":{"allowed":true}}` straight away. The body is handed to the
//! [`Pipeline`] in a background task tracked by [`InFlight`], so parsing and
//! publishing never delay or change the admission decision, and shutdown can
//! wait for them.
//!
//! The same listener serves the probe and metrics routes from
//! [`crate::health`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State, rejection::BytesRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde::Serialize;
use tracing::{error, info};

use super::in_flight::InFlight;
use crate::health::{self, HealthState};
use crate::pipeline::{Pipeline, Route};

/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 8080;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub pipeline: Arc<Pipeline>,
    /// Background pipeline runs started by the handler
    pub in_flight: Arc<InFlight>,
}

impl WebhookState {
    pub fn new(pipeline: Arc<Pipeline>, in_flight: Arc<InFlight>) -> Self {
        Self {
            pipeline,
            in_flight,
        }
    }
}

/// Admission decision body; this webhook only observes, so it always allows.
#[derive(Debug, Serialize)]
pub struct AdmissionAllowed {
    response: AllowedResponse,
}

#[derive(Debug, Serialize)]
struct AllowedResponse {
    allowed: bool,
}

impl AdmissionAllowed {
    pub fn new() -> Self {
        Self {
            response: AllowedResponse { allowed: true },
        }
    }
}

impl Default for AdmissionAllowed {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/{project}/{cluster}", post(admit))
        .with_state(state)
}

/// Create the full application: webhook plus probe routes
pub fn create_app(
    pipeline: Arc<Pipeline>,
    in_flight: Arc<InFlight>,
    health_state: Arc<HealthState>,
) -> Router {
    create_webhook_router(Arc::new(WebhookState::new(pipeline, in_flight)))
        .merge(health::create_router(health_state))
}

/// Admission webhook handler
async fn admit(
    State(state): State<Arc<WebhookState>>,
    Path((project, cluster)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    match body {
        Ok(body) => {
            let pipeline = state.pipeline.clone();
            let route = Route { project, cluster };
            state
                .in_flight
                .spawn(async move { pipeline.run(&body, &route).await })
                .await;
        }
        Err(e) => {
            error!(error = %e, project = %project, cluster = %cluster, "Error reading admission payload");
        }
    }

    (StatusCode::OK, Json(AdmissionAllowed::new()))
}

/// Errors that can occur when running the webhook server
#[derive(Debug)]
pub enum WebhookError {
    /// Could not bind the listen address
    Bind(String),
    /// Server error
    Server(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::Bind(msg) => write!(f, "Failed to bind webhook listener: {}", msg),
            WebhookError::Server(msg) => write!(f, "Webhook server error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}

/// Run the webhook server until `shutdown` resolves
///
/// Binds to 0.0.0.0 on `port` and serves the webhook, probe and metrics
/// routes. Plain HTTP; TLS is terminated in front of the service.
pub async fn run_webhook_server(
    app: Router,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), WebhookError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| WebhookError::Bind(format!("{addr}: {e}")))?;
    info!(port, "Webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
