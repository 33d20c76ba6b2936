//! Task-queue boundary.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{QueueError, TaskError};
use crate::types::TaskId;

/// Boxed future returned by a task body.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// A named callback the queue runs with the JSON payload of each call.
pub type TaskHandler = Arc<dyn Fn(JsonValue) -> TaskFuture + Send + Sync>;

/// Wrap an async closure as a [`TaskHandler`].
pub fn task_handler<F, Fut>(f: F) -> TaskHandler
where
    F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(move |payload: JsonValue| -> TaskFuture { Box::pin(f(payload)) })
}

/// Register named callbacks and enqueue calls to them.
///
/// Calls run asynchronously, later, possibly elsewhere. Delivery is
/// at-least-once; retries are owned by the implementation.
#[async_trait::async_trait]
pub trait TaskQueue: Send + Sync {
    /// Register `handler` under `name`. Names are unique per queue.
    fn register(&self, name: &str, handler: TaskHandler) -> Result<(), QueueError>;

    /// Whether a callback is registered under `name`.
    fn is_registered(&self, name: &str) -> bool;

    /// Enqueue one call. Returns once the queue has accepted it.
    async fn enqueue(&self, name: &str, payload: JsonValue) -> Result<TaskId, QueueError>;
}

#[async_trait::async_trait]
impl<Q> TaskQueue for Arc<Q>
where
    Q: TaskQueue + ?Sized,
{
    fn register(&self, name: &str, handler: TaskHandler) -> Result<(), QueueError> {
        (**self).register(name, handler)
    }

    fn is_registered(&self, name: &str) -> bool {
        (**self).is_registered(name)
    }

    async fn enqueue(&self, name: &str, payload: JsonValue) -> Result<TaskId, QueueError> {
        (**self).enqueue(name, payload).await
    }
}
