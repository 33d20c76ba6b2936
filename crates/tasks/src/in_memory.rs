//! In-process task queue for tests, dev and single-node deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::QueueError;
use crate::queue::{TaskHandler, TaskQueue};
use crate::types::{DeadLetterEntry, QueueStats, RetryPolicy, TaskCall, TaskId};

/// How accepted calls are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// Each call runs on its own tokio task as soon as it is accepted.
    #[default]
    Spawn,
    /// Calls are only recorded; [`InMemoryTaskQueue::run_pending`] runs them.
    Deferred,
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub mode: QueueMode,
    pub retry_policy: RetryPolicy,
    /// Name for logging
    pub name: String,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            mode: QueueMode::Spawn,
            retry_policy: RetryPolicy::default(),
            name: "task-queue".to_string(),
        }
    }
}

impl TaskQueueConfig {
    pub fn with_mode(mut self, mode: QueueMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Default)]
struct Shared {
    stats: Mutex<QueueStats>,
    dead_letters: Mutex<Vec<DeadLetterEntry>>,
}

impl Shared {
    fn record(&self, f: impl FnOnce(&mut QueueStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    fn dead_letter(&self, call: TaskCall, attempts: u32, reason: String) {
        self.record(|s| s.dead_lettered += 1);
        if let Ok(mut dl) = self.dead_letters.lock() {
            dl.push(DeadLetterEntry {
                call,
                attempts,
                reason,
                dead_lettered_at: Utc::now(),
            });
        }
    }
}

/// In-memory [`TaskQueue`].
///
/// In [`QueueMode::Spawn`] every accepted call runs on a tokio task with the
/// configured retry policy, so `enqueue` must be called from inside a tokio
/// runtime. Handles of finished calls are dropped on the next enqueue. [`QueueMode::Deferred`] keeps calls in FIFO order until
/// [`InMemoryTaskQueue::run_pending`] is awaited.
pub struct InMemoryTaskQueue {
    config: TaskQueueConfig,
    handlers: RwLock<HashMap<String, TaskHandler>>,
    pending: Mutex<VecDeque<TaskCall>>,
    running: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl std::fmt::Debug for InMemoryTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTaskQueue")
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(TaskQueueConfig::default())
    }
}

impl InMemoryTaskQueue {
    pub fn new(config: TaskQueueConfig) -> Self {
        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            running: Mutex::new(Vec::new()),
            shared: Arc::new(Shared::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// A spawning queue with the default retry policy.
    pub fn spawning() -> Self {
        Self::default()
    }

    /// A deferred queue with the given retry policy.
    pub fn deferred(retry_policy: RetryPolicy) -> Self {
        Self::new(
            TaskQueueConfig::default()
                .with_mode(QueueMode::Deferred)
                .with_retry_policy(retry_policy),
        )
    }

    pub fn config(&self) -> &TaskQueueConfig {
        &self.config
    }

    /// Reject further enqueues.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Calls accepted in deferred mode and not yet run, oldest first.
    pub fn pending(&self) -> Vec<TaskCall> {
        self.pending
            .lock()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.shared
            .dead_letters
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Run deferred calls in FIFO order until none are left, including calls
    /// enqueued by the tasks being run. Returns the number of calls run.
    pub async fn run_pending(&self) -> Result<usize, QueueError> {
        let mut executed = 0;
        loop {
            let next = self.pending.lock().map_err(poisoned)?.pop_front();
            let Some(call) = next else {
                break;
            };
            let handler = self.handler(&call.name)?;
            run_call(
                handler,
                call,
                self.config.retry_policy,
                self.shared.clone(),
            )
            .await;
            executed += 1;
        }
        Ok(executed)
    }

    /// Wait for every spawned call to finish, including calls spawned while
    /// waiting.
    pub async fn drain(&self) -> Result<(), QueueError> {
        loop {
            let handles: Vec<JoinHandle<()>> =
                self.running.lock().map_err(poisoned)?.drain(..).collect();
            if handles.is_empty() {
                return Ok(());
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(queue = %self.config.name, error = %e, "task panicked");
                }
            }
        }
    }

    fn handler(&self, name: &str) -> Result<TaskHandler, QueueError> {
        self.handlers
            .read()
            .map_err(poisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownTask(name.to_string()))
    }
}

#[async_trait::async_trait]
impl TaskQueue for InMemoryTaskQueue {
    fn register(&self, name: &str, handler: TaskHandler) -> Result<(), QueueError> {
        let mut handlers = self.handlers.write().map_err(poisoned)?;
        if handlers.contains_key(name) {
            return Err(QueueError::DuplicateTask(name.to_string()));
        }
        handlers.insert(name.to_string(), handler);
        debug!(queue = %self.config.name, task = name, "task registered");
        Ok(())
    }

    fn is_registered(&self, name: &str) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(name))
            .unwrap_or(false)
    }

    async fn enqueue(&self, name: &str, payload: JsonValue) -> Result<TaskId, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let handler = self.handler(name)?;
        let call = TaskCall::new(name, payload);
        let id = call.id;

        match self.config.mode {
            QueueMode::Spawn => {
                let join = tokio::spawn(run_call(
                    handler,
                    call,
                    self.config.retry_policy,
                    self.shared.clone(),
                ));
                let mut running = self.running.lock().map_err(poisoned)?;
                running.retain(|handle| !handle.is_finished());
                running.push(join);
            }
            QueueMode::Deferred => {
                self.pending.lock().map_err(poisoned)?.push_back(call);
            }
        }

        self.shared.record(|s| s.enqueued += 1);
        debug!(queue = %self.config.name, task = name, task_id = %id, "task enqueued");
        Ok(id)
    }
}

async fn run_call(handler: TaskHandler, call: TaskCall, policy: RetryPolicy, shared: Arc<Shared>) {
    let mut retries = 0;
    loop {
        match handler(call.payload.clone()).await {
            Ok(()) => {
                shared.record(|s| s.succeeded += 1);
                debug!(task = %call.name, task_id = %call.id, retries, "task completed");
                return;
            }
            Err(e) => {
                shared.record(|s| s.failed_runs += 1);
                if policy.should_retry(retries) {
                    retries += 1;
                    let delay = policy.delay_before(retries);
                    warn!(
                        task = %call.name,
                        task_id = %call.id,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "task failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    error!(
                        task = %call.name,
                        task_id = %call.id,
                        attempts = retries + 1,
                        error = %e,
                        "task exhausted retries"
                    );
                    shared.dead_letter(call, retries + 1, e.0);
                    return;
                }
            }
        }
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> QueueError {
    QueueError::Storage("lock poisoned".to_string())
}
