//! Publishing canonical events to the message queue.
//!
//! [`MessageQueue`] is the narrow capability the pipeline needs from a broker:
//! publish one payload and resolve once it is acknowledged. [`EventPublisher`]
//! sits on top of it, serializes the [`ClusterEvent`] and bounds the wait for
//! the acknowledgment with a deadline. There is no retry and no local
//! spooling; a failed publish is reported to the caller and the event is gone.

pub mod pubsub;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::event::ClusterEvent;

pub use pubsub::{PubSubConfig, PubSubQueue};

/// Broker-assigned identifier of an acknowledged message
pub type MessageId = String;

/// Error type for publish operations
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Could not reach the broker
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Could not obtain credentials for the broker
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The broker answered but did not accept the message
    #[error("Broker rejected message (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// No acknowledgment arrived before the deadline
    #[error("Publish deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

/// Publish-and-await-ack capability of a message queue.
///
/// Implementations are shared by every in-flight request and must be safe
/// for concurrent use.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish `payload` as one message and wait for the broker to accept it.
    async fn publish(&self, payload: Vec<u8>) -> Result<MessageId, PublishError>;
}

/// Serializes events and hands them to a [`MessageQueue`] under a deadline.
#[derive(Clone)]
pub struct EventPublisher {
    queue: Arc<dyn MessageQueue>,
    deadline: Duration,
}

impl EventPublisher {
    pub fn new(queue: Arc<dyn MessageQueue>, deadline: Duration) -> Self {
        Self { queue, deadline }
    }

    /// Publish `event` and wait for the acknowledgment.
    ///
    /// If the deadline passes first the in-flight publish is dropped and
    /// [`PublishError::DeadlineExceeded`] is returned.
    pub async fn publish(&self, event: &ClusterEvent) -> Result<MessageId, PublishError> {
        let payload = event.to_json()?;
        match tokio::time::timeout(self.deadline, self.queue.publish(payload)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::DeadlineExceeded(self.deadline)),
        }
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("queue", &"<MessageQueue>")
            .field("deadline", &self.deadline)
            .finish()
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
    use crate::admission::extract;
    use std::sync::Mutex;

    const POD_CREATE: &str = r#"{"request":{"uid":"u1","namespace":"default","operation":"CREATE","object":{"kind":"Pod","metadata":{"name":"p1","uid":"o1"}}}}"#;

    #[derive(Default)]
    struct RecordingQueue {
        payloads: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl MessageQueue for RecordingQueue {
        async fn publish(&self, payload: Vec<u8>) -> Result<MessageId, PublishError> {
            let mut payloads = self.payloads.lock().unwrap();
            payloads.push(payload);
            Ok(payloads.len().to_string())
        }
    }

    struct SlowQueue;

    #[async_trait]
    impl MessageQueue for SlowQueue {
        async fn publish(&self, _payload: Vec<u8>) -> Result<MessageId, PublishError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".to_string())
        }
    }

    struct RejectingQueue;

    #[async_trait]
    impl MessageQueue for RejectingQueue {
        async fn publish(&self, _payload: Vec<u8>) -> Result<MessageId, PublishError> {
            Err(PublishError::Rejected {
                status: 403,
                message: "permission denied".to_string(),
            })
        }
    }

    fn event() -> ClusterEvent {
        let fields = extract(POD_CREATE.as_bytes()).unwrap();
        ClusterEvent::build(
            &fields,
            "proj",
            "clus",
            jiff::Timestamp::UNIX_EPOCH,
            POD_CREATE.into(),
        )
    }

    #[tokio::test]
    async fn test_publish_sends_wire_json() {
        let queue = Arc::new(RecordingQueue::default());
        let publisher = EventPublisher::new(queue.clone(), Duration::from_secs(5));

        let id = publisher.publish(&event()).await.unwrap();
        assert_eq!(id, "1");

        let payloads = queue.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let decoded: ClusterEvent = serde_json::from_slice(&payloads[0]).unwrap();
        assert_eq!(decoded, event());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let publisher = EventPublisher::new(Arc::new(SlowQueue), Duration::from_secs(2));
        match publisher.publish(&event()).await {
            Err(PublishError::DeadlineExceeded(d)) => assert_eq!(d, Duration::from_secs(2)),
            other => panic!("expected deadline error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejection_is_returned_unmodified() {
        let publisher = EventPublisher::new(Arc::new(RejectingQueue), Duration::from_secs(5));
        let err = publisher.publish(&event()).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { status: 403, .. }));
        assert!(err.to_string().contains("permission denied"));
    }
}
