//! Asynchronous task-queue primitive.
//!
//! ## Components
//!
//! - `TaskQueue`: register a named callback, enqueue calls to it by name
//! - `RetryPolicy`: fixed or capped exponential backoff applied to failed calls
//! - `InMemoryTaskQueue`: in-process queue running calls on tokio tasks, or
//!   deferring them for deterministic tests

pub mod error;
pub mod in_memory;
pub mod queue;
pub mod types;

pub use error::{QueueError, TaskError};
pub use in_memory::{InMemoryTaskQueue, QueueMode, TaskQueueConfig};
pub use queue::{TaskFuture, TaskHandler, TaskQueue, task_handler};
pub use types::{Backoff, DeadLetterEntry, QueueStats, RetryPolicy, TaskCall, TaskId};
