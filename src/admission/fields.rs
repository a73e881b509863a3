//! Canonical fields extracted from an admission review.

use jiff::Timestamp;
use serde_json::Value;
use tracing::{debug, warn};

use super::payload::{AdmissionPayload, Lookup, ParseError};

/// Knative serving label naming the owning service
pub const LABEL_SERVICE: &str = "serving.knative.dev/service";
/// Knative serving label naming the owning configuration
pub const LABEL_CONFIGURATION: &str = "serving.knative.dev/configuration";
/// Knative serving label naming the revision
pub const LABEL_REVISION: &str = "serving.knative.dev/revision";

const PATH_UID: &str = "request.uid";
const PATH_NAMESPACE: &str = "request.namespace";
const PATH_OPERATION: &str = "request.operation";
const PATH_DRY_RUN: &str = "request.dryRun";
const PATH_NAME: &str = "request.name";
const PATH_KIND: &str = "request.kind.kind";
const PATH_OBJECT_KIND: &str = "request.object.kind";
const PATH_OBJECT_NAME: &str = "request.object.metadata.name";
const PATH_OBJECT_UID: &str = "request.object.metadata.uid";
const PATH_OBJECT_CREATED: &str = "request.object.metadata.creationTimestamp";
const PATH_OBJECT_LABELS: &str = "request.object.metadata.labels";

/// Knative serving labels found on the admitted object.
///
/// Empty strings mean the label was not set, which is normal for workloads
/// not managed by Knative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServingLabels {
    pub service: String,
    pub configuration: String,
    pub revision: String,
}

/// The resource an admission call is about.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetObject {
    /// The review embeds the full object (`request.object.kind` is set)
    Embedded {
        kind: String,
        name: String,
        uid: String,
        creation_time: Option<Timestamp>,
        labels: ServingLabels,
    },
    /// No embedded object, typically a DELETE; only the top-level
    /// `request.name` and `request.kind.kind` are known
    Reference { kind: String, name: String },
}

impl TargetObject {
    /// Kind of the target resource (may be empty).
    pub fn kind(&self) -> &str {
        match self {
            TargetObject::Embedded { kind, .. } | TargetObject::Reference { kind, .. } => kind,
        }
    }

    /// Name of the target resource (may be empty).
    pub fn name(&self) -> &str {
        match self {
            TargetObject::Embedded { name, .. } | TargetObject::Reference { name, .. } => name,
        }
    }
}

/// Schema-stable view of one admission review.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionFields {
    pub uid: String,
    pub namespace: String,
    pub operation: String,
    pub dry_run: bool,
    pub target: TargetObject,
    /// Dotted paths that were absent or had an unexpected type
    pub missing: Vec<&'static str>,
}

/// Extract [`AdmissionFields`] from a raw admission review body.
///
/// Fails only when the body is not JSON or has no `request` object. Every
/// other absent leaf is logged and defaulted.
pub fn extract(raw: &[u8]) -> Result<AdmissionFields, ParseError> {
    let payload = AdmissionPayload::parse(raw)?;
    let mut reader = LeafReader {
        payload: &payload,
        missing: Vec::new(),
    };

    let uid = reader.string(PATH_UID);
    let namespace = reader.string(PATH_NAMESPACE);
    let operation = reader.string(PATH_OPERATION);
    let dry_run = reader.bool(PATH_DRY_RUN);

    // object.kind decides which identity branch applies. Its absence is the
    // normal shape of a DELETE review and is not reported; a non-string value is.
    let object_kind = match payload.string(PATH_OBJECT_KIND) {
        Lookup::Missing => String::new(),
        lookup => reader.note(PATH_OBJECT_KIND, lookup),
    };
    let target = if object_kind.is_empty() {
        TargetObject::Reference {
            kind: reader.string(PATH_KIND),
            name: reader.string(PATH_NAME),
        }
    } else {
        TargetObject::Embedded {
            kind: object_kind,
            name: reader.string(PATH_OBJECT_NAME),
            uid: reader.string(PATH_OBJECT_UID),
            creation_time: reader.timestamp(PATH_OBJECT_CREATED),
            labels: reader.serving_labels(PATH_OBJECT_LABELS),
        }
    };

    Ok(AdmissionFields {
        uid,
        namespace,
        operation,
        dry_run,
        target,
        missing: reader.missing,
    })
}

/// Reads leaves with zero-value fallback, remembering what was absent.
struct LeafReader<'a> {
    payload: &'a AdmissionPayload,
    missing: Vec<&'static str>,
}

impl LeafReader<'_> {
    fn note<T: Default>(&mut self, path: &'static str, lookup: Lookup<T>) -> T {
        match lookup {
            Lookup::Found(value) => value,
            Lookup::Missing => {
                warn!(path, "Field not found in admission payload, using default");
                self.missing.push(path);
                T::default()
            }
            Lookup::WrongType => {
                warn!(path, "Field has unexpected type in admission payload, using default");
                self.missing.push(path);
                T::default()
            }
        }
    }

    fn string(&mut self, path: &'static str) -> String {
        let lookup = self.payload.string(path);
        self.note(path, lookup)
    }

    fn bool(&mut self, path: &'static str) -> bool {
        let lookup = self.payload.bool(path);
        self.note(path, lookup)
    }

    fn timestamp(&mut self, path: &'static str) -> Option<Timestamp> {
        let raw = self.string(path);
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<Timestamp>() {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!(path, value = %raw, error = %e, "Unparsable timestamp in admission payload");
                self.missing.push(path);
                None
            }
        }
    }

    fn serving_labels(&mut self, path: &'static str) -> ServingLabels {
        let payload = self.payload;
        let labels = match payload.object(path) {
            Lookup::Found(map) => map,
            Lookup::Missing => {
                self.note::<()>(path, Lookup::Missing);
                return ServingLabels::default();
            }
            Lookup::WrongType => {
                self.note::<()>(path, Lookup::WrongType);
                return ServingLabels::default();
            }
        };

        let label = |key: &str| match labels.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                warn!(path, label = key, "Label value is not a string, ignoring");
                String::new()
            }
            None => {
                debug!(label = key, "Label not set");
                String::new()
            }
        };

        ServingLabels {
            service: label(LABEL_SERVICE),
            configuration: label(LABEL_CONFIGURATION),
            revision: label(LABEL_REVISION),
        }
    }
}
