/// Errors raised by the queue's admission path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("no task registered under '{0}'")]
    UnknownTask(String),
    #[error("task '{0}' is already registered")]
    DuplicateTask(String),
    #[error("task payload error: {0}")]
    Payload(String),
    #[error("queue is closed")]
    Closed,
    #[error("queue storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e.to_string())
    }
}

/// Failure reported by a task body; the queue retries it per its policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TaskError(pub String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
