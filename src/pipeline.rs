//! Event pipeline: extract, filter, build, publish.
//!
//! One [`Pipeline`] is created at startup and shared by every webhook call.
//! Each call runs independently; the only shared pieces are the queue client,
//! the event clock and the metrics registry.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::admission::{ParseError, extract};
use crate::event::{ClusterEvent, EventClock};
use crate::health::HealthState;
use crate::publisher::{EventPublisher, MessageId, PublishError};
use crate::webhooks::policies::{DropReason, FilterResult, PolicyFilter};

/// Error type for pipeline runs
#[derive(Error, Debug)]
pub enum Error {
    /// The body is not an admission review
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The broker did not acknowledge the event
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// What happened to one admission call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Event acknowledged by the broker
    Published {
        event_id: String,
        message_id: MessageId,
    },
    /// Event dropped by policy
    Dropped {
        reason: DropReason,
        namespace: String,
    },
}

/// Route parameters of the webhook URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub project: String,
    pub cluster: String,
}

impl Route {
    pub fn new(project: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            cluster: cluster.into(),
        }
    }
}

/// Shared pipeline state
pub struct Pipeline {
    filter: PolicyFilter,
    publisher: EventPublisher,
    clock: EventClock,
    /// Optional health state for metrics
    health_state: Option<Arc<HealthState>>,
}

impl Pipeline {
    pub fn new(
        filter: PolicyFilter,
        publisher: EventPublisher,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            filter,
            publisher,
            clock: EventClock::new(),
            health_state,
        }
    }

    /// Process one admission body end to end.
    pub async fn process(&self, raw: &[u8], route: &Route) -> Result<Outcome> {
        let fields = extract(raw)?;
        if let Some(state) = &self.health_state {
            state.metrics.record_missing_fields(&fields.missing);
        }

        if let FilterResult {
            dropped: true,
            reason: Some(reason),
        } = self.filter.evaluate(&fields)
        {
            return Ok(Outcome::Dropped {
                reason,
                namespace: fields.namespace,
            });
        }

        let event = ClusterEvent::build(
            &fields,
            &route.project,
            &route.cluster,
            self.clock.now(),
            raw.to_vec(),
        );
        debug!(
            uid = %event.event_id,
            namespace = %event.namespace,
            operation = %event.operation,
            kind = %event.object_kind,
            name = %event.name,
            "Built cluster event"
        );

        let started = Instant::now();
        let result = self.publisher.publish(&event).await;
        if let Some(state) = &self.health_state {
            state
                .metrics
                .record_publish(result.is_ok(), started.elapsed().as_secs_f64());
        }

        Ok(Outcome::Published {
            event_id: event.event_id,
            message_id: result?,
        })
    }

    /// Process one admission body, reporting the outcome through logs and
    /// metrics only. Used from the detached task spawned per webhook call,
    /// where there is nobody left to return an error to.
    pub async fn run(&self, raw: &[u8], route: &Route) {
        if let Some(state) = &self.health_state {
            state.metrics.record_request();
        }
        debug!(payload = %String::from_utf8_lossy(raw), "Admission payload");

        match self.process(raw, route).await {
            Ok(Outcome::Published {
                event_id,
                message_id,
            }) => {
                info!(
                    uid = %event_id,
                    message_id = %message_id,
                    project = %route.project,
                    cluster = %route.cluster,
                    "Event published"
                );
            }
            Ok(Outcome::Dropped { reason, namespace }) => {
                if let Some(state) = &self.health_state {
                    state.metrics.record_drop(reason);
                }
                info!(reason = %reason, namespace = %namespace, "Skipping event");
            }
            Err(Error::Parse(e)) => {
                if let Some(state) = &self.health_state {
                    state.metrics.record_parse_error();
                }
                warn!(error = %e, "Ignoring admission payload");
            }
            Err(Error::Publish(e)) => {
                error!(error = %e, "Failed to publish event");
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::publisher::MessageQueue;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const POD_CREATE: &str = r#"{"request":{"uid":"u1","namespace":"default","operation":"CREATE","dryRun":false,"object":{"kind":"Pod","metadata":{"name":"p1","uid":"o1","creationTimestamp":"2020-01-01T00:00:00Z","labels":{"serving.knative.dev/service":"svc1"}}}}}"#;

    #[derive(Default)]
    struct RecordingQueue {
        payloads: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    #[async_trait]
    impl MessageQueue for RecordingQueue {
        async fn publish(&self, payload: Vec<u8>) -> std::result::Result<MessageId, PublishError> {
            if self.fail {
                return Err(PublishError::Rejected {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            let mut payloads = self.payloads.lock().unwrap();
            payloads.push(payload);
            Ok(format!("msg-{}", payloads.len()))
        }
    }

    fn pipeline(queue: Arc<RecordingQueue>, health: Option<Arc<HealthState>>) -> Pipeline {
        Pipeline::new(
            PolicyFilter::default(),
            EventPublisher::new(queue, Duration::from_secs(5)),
            health,
        )
    }

    fn published(queue: &RecordingQueue) -> Vec<ClusterEvent> {
        queue
            .payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| serde_json::from_slice(p).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_publishes_scenario_event() {
        let queue = Arc::new(RecordingQueue::default());
        let pipeline = pipeline(queue.clone(), None);

        let outcome = pipeline
            .process(POD_CREATE.as_bytes(), &Route::new("proj", "clus"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Published {
                event_id: "u1".to_string(),
                message_id: "msg-1".to_string(),
            }
        );

        let events = published(&queue);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_id, "u1");
        assert_eq!(event.project, "proj");
        assert_eq!(event.cluster, "clus");
        assert_eq!(event.namespace, "default");
        assert_eq!(event.operation, "CREATE");
        assert_eq!(event.name, "p1");
        assert_eq!(event.object_id, "o1");
        assert_eq!(event.service, "svc1");
        assert_eq!(event.configuration, "");
        assert_eq!(event.revision, "");
        assert_eq!(event.content, POD_CREATE.as_bytes());
    }

    #[tokio::test]
    async fn test_dry_run_not_published() {
        let queue = Arc::new(RecordingQueue::default());
        let pipeline = pipeline(queue.clone(), None);
        let raw = POD_CREATE.replace(r#""dryRun":false"#, r#""dryRun":true"#);

        let outcome = pipeline
            .process(raw.as_bytes(), &Route::new("proj", "clus"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Dropped {
                reason: DropReason::DryRun,
                ..
            }
        ));
        assert!(published(&queue).is_empty());
    }

    #[tokio::test]
    async fn test_excluded_namespace_not_published() {
        let queue = Arc::new(RecordingQueue::default());
        let pipeline = pipeline(queue.clone(), None);
        let raw = POD_CREATE.replace(r#""namespace":"default""#, r#""namespace":"istio-system""#);

        let outcome = pipeline
            .process(raw.as_bytes(), &Route::new("proj", "clus"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Dropped {
                reason: DropReason::ExcludedNamespace,
                namespace: "istio-system".to_string(),
            }
        );
        assert!(published(&queue).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_not_published() {
        let queue = Arc::new(RecordingQueue::default());
        let health = Arc::new(HealthState::new());
        let pipeline = pipeline(queue.clone(), Some(health.clone()));

        let err = pipeline
            .process(b"{\"request\":", &Route::new("proj", "clus"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));

        pipeline.run(b"not json", &Route::new("proj", "clus")).await;
        assert!(published(&queue).is_empty());
        assert_eq!(health.metrics.parse_errors_total.get(), 1);
        assert_eq!(health.metrics.admission_requests_total.get(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_surfaced() {
        let queue = Arc::new(RecordingQueue {
            fail: true,
            ..Default::default()
        });
        let health = Arc::new(HealthState::new());
        let pipeline = pipeline(queue, Some(health.clone()));

        let err = pipeline
            .process(POD_CREATE.as_bytes(), &Route::new("proj", "clus"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Publish(PublishError::Rejected { status: 503, .. })
        ));
        assert_eq!(health.metrics.publish_errors_total.get(), 1);
        assert_eq!(health.metrics.events_published_total.get(), 0);
    }

    #[tokio::test]
    async fn test_event_time_non_decreasing() {
        let queue = Arc::new(RecordingQueue::default());
        let pipeline = pipeline(queue.clone(), None);
        for _ in 0..10 {
            pipeline
                .process(POD_CREATE.as_bytes(), &Route::new("proj", "clus"))
                .await
                .unwrap();
        }
        let events = published(&queue);
        assert!(events.windows(2).all(|w| w[0].event_time <= w[1].event_time));
    }

    #[tokio::test]
    async fn test_run_records_drop_metrics() {
        let queue = Arc::new(RecordingQueue::default());
        let health = Arc::new(HealthState::new());
        let pipeline = pipeline(queue, Some(health.clone()));
        let raw = POD_CREATE.replace(r#""dryRun":false"#, r#""dryRun":true"#);

        pipeline.run(raw.as_bytes(), &Route::new("proj", "clus")).await;
        assert!(health.metrics.encode().contains("reason=\"dry_run\""));
    }
}
