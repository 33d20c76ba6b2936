use std::time::Duration;

use thiserror::Error;

use commerce_datastore::{DecodeError, StoreError};
use commerce_tasks::QueueError;

use crate::warehouse::WarehouseError;

/// Configuration error: a malformed registration or dispatch request.
///
/// Raised synchronously at the registration or dispatch call site and never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("worker name must be non-empty and free of whitespace, got {0:?}")]
    InvalidWorkerName(String),

    #[error("worker '{0}' is already registered")]
    DuplicateWorker(String),

    #[error("entity type {entity} of worker '{worker}' has an empty kind")]
    EmptyKind { worker: String, entity: &'static str },

    #[error("worker '{0}' emits warehouse rows but no warehouse is configured")]
    WarehouseNotConfigured(String),

    #[error("unknown worker '{0}'")]
    UnknownWorker(String),

    #[error("worker '{worker}' takes parameters of type {expected}, got {actual}")]
    ParamsType {
        worker: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("migration '{0}' has no workers")]
    EmptyMigration(String),

    #[error("invalid value {value:?} for setting '{key}'")]
    InvalidSetting { key: &'static str, value: String },

    #[error("task registration failed: {0}")]
    TaskRegistration(QueueError),
}

/// Error returned by `run_all` and the synchronous entry points.
///
/// Store errors surface before anything is enqueued, since every namespace
/// is counted first. A queue error stops the dispatch where it happens:
/// batches already accepted, including whole earlier namespaces, stay
/// enqueued and will run. Failures inside an enqueued batch are reported
/// through its `BatchReport`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("collection store error: {0}")]
    Store(#[from] StoreError),

    #[error("task queue error: {0}")]
    Queue(QueueError),

    #[error("could not encode worker parameters: {0}")]
    Params(String),

    #[error("migration setup failed: {0}")]
    Setup(String),
}

impl From<QueueError> for DispatchError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::UnknownTask(task) => DispatchError::Config(ConfigError::UnknownWorker(task)),
            other => DispatchError::Queue(other),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(value: serde_json::Error) -> Self {
        DispatchError::Params(value.to_string())
    }
}

/// Fatal per-batch error. Aborts only the batch it occurs in.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("invalid batch payload: {0}")]
    Payload(String),

    #[error("invalid worker parameters: {0}")]
    Params(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("batch timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

impl BatchError {
    /// Transient failures the task queue may retry.
    ///
    /// Store errors only occur while reading the page, before any record was
    /// delivered. Malformed records, bad payloads and timeouts fail the same
    /// way on every run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BatchError::Store(_) | BatchError::Warehouse(_))
    }
}
