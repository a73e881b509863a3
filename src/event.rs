//! Canonical cluster event published for downstream consumers.

use std::sync::atomic::{AtomicI64, Ordering};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::admission::{AdmissionFields, ServingLabels, TargetObject};

/// Normalized record of one admission call.
///
/// Field names are the wire names (snake_case JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvent {
    /// Admission UID; a best-effort correlation key, not unique across retries
    pub event_id: String,
    pub project: String,
    pub cluster: String,
    pub namespace: String,
    pub operation: String,
    /// Processing time, not the admission time
    pub event_time: Timestamp,
    pub name: String,
    pub object_kind: String,
    pub object_id: String,
    /// Creation time of the embedded object. When the review embeds no
    /// object or the timestamp does not parse, this is JSON `null` on the
    /// wire, not a zero-time string such as `0001-01-01T00:00:00Z`.
    /// Consumers must accept `null` here.
    pub object_creation_time: Option<Timestamp>,
    pub service: String,
    pub configuration: String,
    pub revision: String,
    /// Original request body, byte for byte
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl ClusterEvent {
    /// Map extracted fields onto a canonical event.
    ///
    /// When the review embeds an object, its metadata and serving labels
    /// describe the target. Otherwise only the top-level request name and
    /// kind are known and the label fields stay empty.
    pub fn build(
        fields: &AdmissionFields,
        project: &str,
        cluster: &str,
        now: Timestamp,
        content: Vec<u8>,
    ) -> Self {
        let (name, object_kind, object_id, object_creation_time, labels) = match &fields.target {
            TargetObject::Embedded {
                kind,
                name,
                uid,
                creation_time,
                labels,
            } => (
                name.clone(),
                kind.clone(),
                uid.clone(),
                *creation_time,
                labels.clone(),
            ),
            TargetObject::Reference { kind, name } => (
                name.clone(),
                kind.clone(),
                String::new(),
                None,
                ServingLabels::default(),
            ),
        };

        Self {
            event_id: fields.uid.clone(),
            project: project.to_string(),
            cluster: cluster.to_string(),
            namespace: fields.namespace.clone(),
            operation: fields.operation.clone(),
            event_time: now,
            name,
            object_kind,
            object_id,
            object_creation_time,
            service: labels.service,
            configuration: labels.configuration,
            revision: labels.revision,
            content,
        }
    }

    /// Wire representation of the event.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Wall clock that never goes backwards within a process.
///
/// Readings are clamped to the latest value handed out, so a system clock
/// step backwards yields repeated timestamps rather than decreasing ones.
#[derive(Debug, Default)]
pub struct EventClock {
    last_micros: AtomicI64,
}

impl EventClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current UTC time at microsecond precision, never earlier than a
    /// previous reading.
    pub fn now(&self) -> Timestamp {
        self.observe(Timestamp::now())
    }

    fn observe(&self, wall: Timestamp) -> Timestamp {
        let micros = wall.as_microsecond();
        let previous = self.last_micros.fetch_max(micros, Ordering::SeqCst);
        Timestamp::from_microsecond(previous.max(micros)).unwrap_or(wall)
    }
}

/// Byte fields travel as standard (padded) base64 strings.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
