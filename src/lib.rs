//! kadvice library crate
//!
//! Receives Kubernetes admission webhook calls, normalizes them into
//! [`ClusterEvent`]s and publishes them to a Pub/Sub topic. The admission
//! decision is always "allowed"; event processing happens after the response
//! and can never block or deny a cluster operation.

pub mod admission;
pub mod config;
pub mod event;
pub mod health;
pub mod pipeline;
pub mod publisher;
pub mod webhooks;

pub use config::Config;
pub use event::ClusterEvent;
pub use health::HealthState;
pub use pipeline::{Outcome, Pipeline, Route};
pub use publisher::{EventPublisher, MessageQueue, PubSubConfig, PubSubQueue, PublishError};
pub use webhooks::{InFlight, WEBHOOK_PORT, WebhookError, create_app, run_webhook_server};
