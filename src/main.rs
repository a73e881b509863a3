//! kadvice - Kubernetes admission events to Pub/Sub.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads configuration and resolves the GCP project
//! - Connects to Pub/Sub and makes sure the topic exists
//! - Serves the admission webhook and probes until shutdown

use std::sync::Arc;
use std::time::Duration;

use gcp_auth::TokenProvider;
use tokio::signal;
use tracing::{info, warn};

use kadvice::config::Config;
use kadvice::health::HealthState;
use kadvice::pipeline::Pipeline;
use kadvice::publisher::{EventPublisher, PubSubConfig, PubSubQueue};
use kadvice::webhooks::{InFlight, PolicyFilter, create_app, run_webhook_server};

/// Extra time on top of the publish deadline for in-flight runs to report
const SHUTDOWN_SLACK_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kadvice=info".parse()?),
        )
        .json()
        .init();

    info!("Starting kadvice");

    let config = Config::from_env()?;

    // The emulator needs no credentials; everything else authenticates via gcp_auth
    let token_provider: Option<Arc<dyn TokenProvider>> = match &config.emulator_host {
        Some(host) => {
            warn!(host = %host, "PUBSUB_EMULATOR_HOST set, publishing to emulator without credentials");
            None
        }
        None => Some(gcp_auth::provider().await?),
    };

    let project = match (&config.project, &token_provider) {
        (Some(project), _) => project.clone(),
        (None, Some(provider)) => {
            let project = provider.project_id().await?.to_string();
            info!(project = %project, "Discovered project from credentials");
            project
        }
        (None, None) => return Err("PROJECT must be set when using the Pub/Sub emulator".into()),
    };

    let mut pubsub_config = PubSubConfig::new(project, config.topic.clone());
    if let Some(host) = &config.emulator_host {
        pubsub_config = pubsub_config.with_emulator(host);
    }
    let queue = Arc::new(PubSubQueue::new(pubsub_config, token_provider)?);
    queue.ensure_topic().await?;
    info!(topic = %queue.config().topic_path(), "Connected to Pub/Sub");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    let pipeline = Arc::new(Pipeline::new(
        PolicyFilter::new(config.excluded_namespaces.clone()),
        EventPublisher::new(queue, config.publish_timeout),
        Some(health_state.clone()),
    ));

    let in_flight = Arc::new(InFlight::new());
    let app = create_app(pipeline, in_flight.clone(), health_state.clone());
    health_state.set_ready(true).await;

    let shutdown = {
        let health_state = health_state.clone();
        async move {
            shutdown_signal().await;
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            info!("Marked service as not ready");
        }
    };

    run_webhook_server(app, config.port, shutdown).await?;

    // Every run is bounded by the publish deadline, so each one reaches an
    // outcome (and its log line and metric) within this window
    let abandoned = in_flight
        .drain(config.publish_timeout + Duration::from_secs(SHUTDOWN_SLACK_SECS))
        .await;
    if abandoned > 0 {
        warn!(abandoned, "Shutting down with unfinished publishes");
    }

    info!("kadvice stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the service cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
