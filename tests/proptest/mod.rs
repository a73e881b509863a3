// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for kadvice.
//!
//! Uses proptest to generate admission reviews and verify the pipeline's
//! filtering and fidelity guarantees.

#[path = "../common/mod.rs"]
mod common;

use std::future::Future;

use proptest::prelude::*;

use kadvice::admission::extract;
use kadvice::webhooks::ExcludedNamespaces;
use kadvice::{Outcome, Route};

use common::fixtures::ReviewBuilder;
use common::mock_queue::{RecordingQueue, pipeline, pipeline_with};

/// Strategy for generating namespace names.
fn namespace() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}"
}

/// Strategy for generating admission operations.
fn operation() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("CREATE".to_string()),
        Just("UPDATE".to_string()),
        Just("DELETE".to_string()),
        Just("CONNECT".to_string()),
    ]
}

/// Strategy for generating label values, including empty ones.
fn label_value() -> impl Strategy<Value = String> {
    "[a-z0-9-]{0,16}"
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn route() -> Route {
    Route::new("prop-project", "prop-cluster")
}

proptest! {
    /// Dry-run reviews are never published, whatever else they contain.
    #[test]
    fn dry_run_never_published(
        ns in namespace(),
        op in operation(),
        with_object in any::<bool>(),
    ) {
        let mut builder = ReviewBuilder::new("u").namespace(&ns).operation(&op).dry_run(true);
        if !with_object {
            builder = builder.without_object();
        }
        let raw = builder.build();

        let queue = RecordingQueue::new();
        let outcome = block_on(pipeline(queue.clone()).process(&raw, &route())).unwrap();

        let is_dropped = matches!(outcome, Outcome::Dropped { .. });
        prop_assert!(is_dropped);
        prop_assert_eq!(queue.count(), 0);
    }

    /// Reviews from an excluded namespace are never published.
    #[test]
    fn excluded_namespace_never_published(
        excluded in prop::collection::vec(namespace(), 1..5),
        pick in any::<prop::sample::Index>(),
        op in operation(),
    ) {
        let ns = pick.get(&excluded).clone();
        let list: ExcludedNamespaces = excluded.iter().cloned().collect();
        let raw = ReviewBuilder::new("u").namespace(&ns).operation(&op).build();

        let queue = RecordingQueue::new();
        let outcome = block_on(pipeline_with(queue.clone(), list, None).process(&raw, &route())).unwrap();

        let is_dropped = matches!(outcome, Outcome::Dropped { .. });
        prop_assert!(is_dropped);
        prop_assert_eq!(queue.count(), 0);
    }

    /// Forwarded events carry the request identity and the exact body.
    #[test]
    fn forwarded_event_preserves_request(
        uid in "[a-f0-9-]{1,36}",
        ns in namespace().prop_filter("not excluded", |ns| ns != "istio-system"),
        op in operation(),
        service in label_value(),
        configuration in label_value(),
        revision in label_value(),
    ) {
        let raw = ReviewBuilder::new(&uid)
            .namespace(&ns)
            .operation(&op)
            .serving_labels(&service, &configuration, &revision)
            .build();

        let queue = RecordingQueue::new();
        block_on(pipeline(queue.clone()).process(&raw, &route())).unwrap();

        let events = queue.events();
        prop_assert_eq!(events.len(), 1);
        let event = &events[0];
        prop_assert_eq!(&event.event_id, &uid);
        prop_assert_eq!(&event.namespace, &ns);
        prop_assert_eq!(&event.operation, &op);
        prop_assert_eq!(&event.service, &service);
        prop_assert_eq!(&event.configuration, &configuration);
        prop_assert_eq!(&event.revision, &revision);
        prop_assert_eq!(&event.content, &raw);
    }

    /// Extraction never panics on arbitrary input.
    #[test]
    fn extract_never_panics(raw in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = extract(&raw);
    }

    /// Any JSON object under `request` is accepted, with unknown shapes defaulted.
    #[test]
    fn any_request_object_is_accepted(
        key in "[a-zA-Z]{1,10}",
        value in "[ -~]{0,20}",
    ) {
        let raw = serde_json::to_vec(&serde_json::json!({"request": {key: value}})).unwrap();
        prop_assert!(extract(&raw).is_ok());
    }

    /// Parsing an exclusion list keeps every non-blank entry, trimmed.
    #[test]
    fn exclusion_list_parsing(entries in prop::collection::vec(" {0,2}[a-z-]{0,8} {0,2}", 0..6)) {
        let joined = entries.join(",");
        let parsed: ExcludedNamespaces = joined.parse().unwrap();

        for entry in &entries {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                continue;
            }
            prop_assert!(parsed.contains(trimmed));
        }
        prop_assert_eq!(parsed.is_empty(), entries.iter().all(|e| e.trim().is_empty()));
    }
}
