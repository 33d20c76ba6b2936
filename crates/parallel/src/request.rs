//! Batch task payload.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use commerce_core::{Namespace, RequestSnapshot};

use crate::error::BatchError;

/// Identifier shared by every batch of one `run_all` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(pub Uuid);

impl DispatchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `[offset, offset + limit)` window of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindow {
    pub offset: usize,
    pub limit: usize,
}

impl BatchWindow {
    pub fn end(&self) -> usize {
        self.offset + self.limit
    }
}

/// Payload of one enqueued batch call.
///
/// Built once per batch by the dispatcher, consumed by one executor run and
/// never persisted beyond the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub dispatch_id: DispatchId,
    pub worker: String,
    pub namespace: Namespace,
    pub request: RequestSnapshot,
    #[serde(flatten)]
    pub window: BatchWindow,
    /// Position of this batch within its namespace's dispatch
    pub batch_index: usize,
    pub batch_count: usize,
    /// Worker parameters, encoded once per dispatch
    pub params: JsonValue,
}

impl BatchRequest {
    pub fn to_payload(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_payload(payload: JsonValue) -> Result<Self, BatchError> {
        serde_json::from_value(payload).map_err(|e| BatchError::Payload(e.to_string()))
    }
}
