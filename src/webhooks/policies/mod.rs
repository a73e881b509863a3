//! Drop policies for admission events.
//!
//! Policies run in order and the first one that drops wins:
//! 1. Dry-run requests (no side effects, nothing to report)
//! 2. Excluded namespaces (configured, `istio-system` by default)

pub mod dry_run;
pub mod excluded_namespace;

use std::fmt;

use crate::admission::AdmissionFields;

pub use excluded_namespace::{DEFAULT_EXCLUDED_NAMESPACES, ExcludedNamespaces};

/// Why an event was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The admission call was a dry run
    DryRun,
    /// The namespace is in the exclusion set
    ExcludedNamespace,
}

impl DropReason {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::DryRun => "dry_run",
            DropReason::ExcludedNamespace => "excluded_namespace",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a filter check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    /// Whether the event should be dropped
    pub dropped: bool,
    /// Reason for dropping (if dropped)
    pub reason: Option<DropReason>,
}

impl FilterResult {
    /// Create a result that lets the event through
    pub fn forward() -> Self {
        Self {
            dropped: false,
            reason: None,
        }
    }

    /// Create a result that drops the event
    pub fn dropped(reason: DropReason) -> Self {
        Self {
            dropped: true,
            reason: Some(reason),
        }
    }
}

/// Context for filtering
pub struct FilterContext<'a> {
    /// Fields extracted from the admission review
    pub fields: &'a AdmissionFields,
    /// Namespaces whose events are never forwarded
    pub excluded_namespaces: &'a ExcludedNamespaces,
}

/// Run all drop policies
pub fn evaluate_all(ctx: &FilterContext<'_>) -> FilterResult {
    let result = dry_run::evaluate(ctx);
    if result.dropped {
        return result;
    }

    let result = excluded_namespace::evaluate(ctx);
    if result.dropped {
        return result;
    }

    FilterResult::forward()
}

/// Policy filter with its exclusion set injected at construction.
#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    excluded_namespaces: ExcludedNamespaces,
}

impl PolicyFilter {
    pub fn new(excluded_namespaces: ExcludedNamespaces) -> Self {
        Self {
            excluded_namespaces,
        }
    }

    pub fn excluded_namespaces(&self) -> &ExcludedNamespaces {
        &self.excluded_namespaces
    }

    /// Evaluate every policy against `fields`.
    pub fn evaluate(&self, fields: &AdmissionFields) -> FilterResult {
        evaluate_all(&FilterContext {
            fields,
            excluded_namespaces: &self.excluded_namespaces,
        })
    }

    /// Whether the event described by `fields` must not be forwarded.
    pub fn should_drop(&self, fields: &AdmissionFields) -> bool {
        self.evaluate(fields).dropped
    }
}
