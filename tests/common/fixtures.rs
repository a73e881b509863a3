//! Admission review fixtures and a builder for synthetic reviews.

use serde_json::{Map, Value, json};

/// CREATE of a Knative-managed pod with every field populated.
pub const POD_CREATE: &[u8] = include_bytes!("../fixtures/pod-create.json");
/// DELETE of the same pod; the review embeds no object.
pub const POD_DELETE: &[u8] = include_bytes!("../fixtures/pod-delete.json");
/// CREATE of a pod in `istio-system`.
pub const POD_ISTIO_CREATE: &[u8] = include_bytes!("../fixtures/pod-istio-create.json");

/// Builder for synthetic admission reviews.
///
/// # Example
/// ```
/// let raw = ReviewBuilder::new("uid-1")
///     .namespace("demo")
///     .operation("UPDATE")
///     .dry_run(true)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct ReviewBuilder {
    uid: String,
    namespace: String,
    operation: String,
    dry_run: Option<bool>,
    kind: String,
    name: String,
    object: Option<Value>,
}

impl ReviewBuilder {
    /// A CREATE of an unlabeled pod named `pod-1` in `default`.
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            namespace: "default".to_string(),
            operation: "CREATE".to_string(),
            dry_run: Some(false),
            kind: "Pod".to_string(),
            name: "pod-1".to_string(),
            object: Some(json!({
                "kind": "Pod",
                "metadata": {
                    "name": "pod-1",
                    "uid": "obj-1",
                    "creationTimestamp": "2020-01-01T00:00:00Z",
                    "labels": {}
                }
            })),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn operation(mut self, operation: &str) -> Self {
        self.operation = operation.to_string();
        self
    }

    /// `None` leaves `dryRun` out of the review.
    pub fn dry_run(mut self, dry_run: impl Into<Option<bool>>) -> Self {
        self.dry_run = dry_run.into();
        self
    }

    /// Replace the embedded object.
    pub fn object(mut self, object: Value) -> Self {
        self.object = Some(object);
        self
    }

    /// Drop the embedded object, as in a DELETE review.
    pub fn without_object(mut self) -> Self {
        self.object = None;
        self
    }

    /// Set the serving labels on the embedded object.
    pub fn serving_labels(mut self, service: &str, configuration: &str, revision: &str) -> Self {
        if let Some(metadata) = self
            .object
            .as_mut()
            .and_then(|object| object.get_mut("metadata"))
        {
            metadata["labels"] = json!({
                "serving.knative.dev/service": service,
                "serving.knative.dev/configuration": configuration,
                "serving.knative.dev/revision": revision,
            });
        }
        self
    }

    pub fn build_value(&self) -> Value {
        let mut request = Map::new();
        request.insert("uid".to_string(), json!(self.uid));
        request.insert("kind".to_string(), json!({"group": "", "version": "v1", "kind": self.kind}));
        request.insert("name".to_string(), json!(self.name));
        request.insert("namespace".to_string(), json!(self.namespace));
        request.insert("operation".to_string(), json!(self.operation));
        if let Some(dry_run) = self.dry_run {
            request.insert("dryRun".to_string(), json!(dry_run));
        }
        if let Some(object) = &self.object {
            request.insert("object".to_string(), object.clone());
        }

        json!({
            "kind": "AdmissionReview",
            "apiVersion": "admission.k8s.io/v1",
            "request": request,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        serde_json::to_vec(&self.build_value()).unwrap()
    }
}
