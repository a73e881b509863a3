// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for kadvice.
//!
//! These tests run without a broker or a cluster and exercise the public
//! types in isolation.

mod admission_tests {
    use kadvice::admission::{AdmissionPayload, Lookup, ParseError, TargetObject, extract};

    #[test]
    fn test_lookup_walks_nested_objects_and_arrays() {
        let payload = AdmissionPayload::parse(
            br#"{"request":{"userInfo":{"groups":["system:masters","dev"]},"object":null}}"#,
        )
        .unwrap();

        assert_eq!(
            payload.string("request.userInfo.groups.1"),
            Lookup::Found("dev".to_string())
        );
        assert_eq!(payload.string("request.userInfo.groups.7"), Lookup::Missing);
        assert_eq!(payload.string("request.userInfo"), Lookup::WrongType);
        assert!(payload.lookup("request.object").is_none());
    }

    #[test]
    fn test_parse_rejects_non_reviews() {
        assert!(matches!(
            AdmissionPayload::parse(b"{"),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(
            AdmissionPayload::parse(br#"{"response":{}}"#),
            Err(ParseError::NotAdmissionReview)
        ));
    }

    #[test]
    fn test_extract_reference_target() {
        let fields = extract(
            br#"{"request":{"uid":"u","name":"cm-1","kind":{"kind":"ConfigMap"},"operation":"DELETE"}}"#,
        )
        .unwrap();

        assert_eq!(
            fields.target,
            TargetObject::Reference {
                kind: "ConfigMap".to_string(),
                name: "cm-1".to_string(),
            }
        );
        assert_eq!(fields.target.kind(), "ConfigMap");
        assert_eq!(fields.target.name(), "cm-1");
        assert!(fields.missing.contains(&"request.dryRun"));
        assert!(fields.missing.contains(&"request.namespace"));
    }
}

mod event_tests {
    use jiff::Timestamp;
    use kadvice::ClusterEvent;
    use kadvice::admission::extract;

    const RAW: &[u8] = br#"{"request":{"uid":"u1","namespace":"default","operation":"CREATE","object":{"kind":"Pod","metadata":{"name":"p1","uid":"o1","creationTimestamp":"2020-01-01T00:00:00Z","labels":{"serving.knative.dev/service":"svc1"}}}}}"#;

    #[test]
    fn test_wire_format() {
        let fields = extract(RAW).unwrap();
        let now: Timestamp = "2024-03-01T12:00:00.123456Z".parse().unwrap();
        let event = ClusterEvent::build(&fields, "proj", "clus", now, b"{}".to_vec());

        let json: serde_json::Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["event_id"], "u1");
        assert_eq!(json["project"], "proj");
        assert_eq!(json["cluster"], "clus");
        assert_eq!(json["namespace"], "default");
        assert_eq!(json["operation"], "CREATE");
        assert_eq!(json["event_time"], "2024-03-01T12:00:00.123456Z");
        assert_eq!(json["name"], "p1");
        assert_eq!(json["object_kind"], "Pod");
        assert_eq!(json["object_id"], "o1");
        assert_eq!(json["object_creation_time"], "2020-01-01T00:00:00Z");
        assert_eq!(json["service"], "svc1");
        assert_eq!(json["configuration"], "");
        assert_eq!(json["revision"], "");
        assert_eq!(json["content"], "e30=");
        assert_eq!(json.as_object().unwrap().len(), 14);
    }
}

mod policy_tests {
    use kadvice::webhooks::{DropReason, ExcludedNamespaces, PolicyFilter};

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::DryRun.to_string(), "dry_run");
        assert_eq!(DropReason::ExcludedNamespace.to_string(), "excluded_namespace");
    }

    #[test]
    fn test_default_exclusions() {
        let excluded = ExcludedNamespaces::default();
        assert!(excluded.contains("istio-system"));
        assert!(!excluded.contains("default"));
        assert_eq!(excluded.to_string(), "istio-system");
    }

    #[test]
    fn test_exclusions_display_sorted() {
        let excluded: ExcludedNamespaces = "kube-system, istio-system,,".parse().unwrap();
        assert_eq!(excluded.to_string(), "istio-system,kube-system");
        assert!(ExcludedNamespaces::none().is_empty());
    }

    #[test]
    fn test_filter_exposes_exclusions() {
        let filter = PolicyFilter::new(ExcludedNamespaces::none());
        assert!(filter.excluded_namespaces().is_empty());
    }
}

mod config_tests {
    use std::time::Duration;

    use kadvice::config::{Config, ConfigError};

    #[test]
    fn test_from_lookup_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.project, None);
        assert_eq!(config.topic, "kadvice");
        assert_eq!(config.port, kadvice::WEBHOOK_PORT);
        assert_eq!(config.publish_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_negative_port_is_invalid() {
        let err = Config::from_lookup(|key| (key == "PORT").then(|| "-1".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        assert!(err.to_string().contains("PORT"));
    }
}

mod publisher_tests {
    use std::time::Duration;

    use kadvice::{PubSubConfig, PublishError};

    #[test]
    fn test_topic_path() {
        let config = PubSubConfig::new("my-project", "kadvice");
        assert_eq!(config.topic_path(), "projects/my-project/topics/kadvice");
        assert!(!config.emulator);
    }

    #[test]
    fn test_emulator_endpoint() {
        let config = PubSubConfig::new("p", "t").with_emulator("localhost:8085");
        assert_eq!(config.endpoint, "http://localhost:8085");
        assert!(config.emulator);
    }

    #[test]
    fn test_error_display() {
        let err = PublishError::Rejected {
            status: 403,
            message: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Broker rejected message (status 403): permission denied"
        );
        assert!(
            PublishError::DeadlineExceeded(Duration::from_secs(30))
                .to_string()
                .contains("30s")
        );
    }
}

mod webhook_tests {
    use kadvice::webhooks::AdmissionAllowed;

    #[test]
    fn test_allowed_response() {
        assert_eq!(
            serde_json::to_value(AdmissionAllowed::default()).unwrap(),
            serde_json::json!({"response": {"allowed": true}})
        );
    }
}
