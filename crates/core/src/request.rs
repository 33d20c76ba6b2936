//! Request-scoped context captured for work that runs outside the request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Opaque, serializable snapshot of a caller's request context.
///
/// Asynchronous work (e.g. a batch executed later by a task queue) has no
/// access to the request that scheduled it; the snapshot travels with the
/// task payload and is restored on the executing side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestSnapshot(Map<String, JsonValue>);

impl RequestSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Convenience accessor for string values.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
