//! Loosely-typed admission review tree with dotted-path lookup.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that abort extraction of a single admission payload.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The body is not valid JSON
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The body is JSON but has no `request` object
    #[error("payload is not an admission review: missing `request` object")]
    NotAdmissionReview,
}

/// Result of querying a single leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The leaf exists and has the expected type
    Found(T),
    /// Nothing at that path
    Missing,
    /// Something at that path, but not of the expected type
    WrongType,
}

impl<T> Lookup<T> {
    /// Convert into an `Option`, dropping the missing/wrong-type distinction.
    pub fn ok(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing | Lookup::WrongType => None,
        }
    }
}

/// A decoded admission review, held only for the duration of one request.
#[derive(Debug, Clone)]
pub struct AdmissionPayload {
    root: Value,
}

impl AdmissionPayload {
    /// Decode `raw` and check that it is shaped like an admission review.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let root: Value = serde_json::from_slice(raw)?;
        let payload = Self { root };
        match payload.lookup("request") {
            Some(Value::Object(_)) => Ok(payload),
            _ => Err(ParseError::NotAdmissionReview),
        }
    }

    /// Walk `path` (segments separated by `.`) from the root.
    ///
    /// Numeric segments index into arrays. Explicit JSON `null` counts as absent.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        if current.is_null() { None } else { Some(current) }
    }

    /// String leaf at `path`.
    pub fn string(&self, path: &str) -> Lookup<String> {
        match self.lookup(path) {
            Some(Value::String(s)) => Lookup::Found(s.clone()),
            Some(_) => Lookup::WrongType,
            None => Lookup::Missing,
        }
    }

    /// Boolean leaf at `path`.
    pub fn bool(&self, path: &str) -> Lookup<bool> {
        match self.lookup(path) {
            Some(Value::Bool(b)) => Lookup::Found(*b),
            Some(_) => Lookup::WrongType,
            None => Lookup::Missing,
        }
    }

    /// Object node at `path`.
    pub fn object(&self, path: &str) -> Lookup<&Map<String, Value>> {
        match self.lookup(path) {
            Some(Value::Object(map)) => Lookup::Found(map),
            Some(_) => Lookup::WrongType,
            None => Lookup::Missing,
        }
    }
}
