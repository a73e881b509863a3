//! Namespace exclusion policy.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use super::{DropReason, FilterContext, FilterResult};

/// Namespaces excluded when nothing else is configured
pub const DEFAULT_EXCLUDED_NAMESPACES: &[&str] = &["istio-system"];

/// Set of namespaces whose admission events are never forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedNamespaces(BTreeSet<String>);

impl ExcludedNamespaces {
    /// An empty set: nothing is excluded
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.0.contains(namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ExcludedNamespaces {
    fn default() -> Self {
        DEFAULT_EXCLUDED_NAMESPACES.iter().copied().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ExcludedNamespaces {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Parses a comma-separated list; blanks are skipped, so `""` is the empty set.
impl FromStr for ExcludedNamespaces {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .collect())
    }
}

impl fmt::Display for ExcludedNamespaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

/// Drop events from excluded namespaces
pub fn evaluate(ctx: &FilterContext<'_>) -> FilterResult {
    if ctx.excluded_namespaces.contains(&ctx.fields.namespace) {
        return FilterResult::dropped(DropReason::ExcludedNamespace);
    }
    FilterResult::forward()
}
