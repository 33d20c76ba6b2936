//! Batch executor: the body of one enqueued batch call.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle → Paging → Invoking (one record at a time) → Done | AbortedOnError
//! ```
//!
//! The whole paging and invoking phase runs under the configured batch
//! timeout. Warehouse rows are flushed after the loop ends, whether it ended
//! by exhaustion, abort or timeout. There is no retry inside the executor.
//! Only aborts marked [`BatchReport::retryable`] (store and warehouse
//! failures) are reported to the task queue as errors; a malformed record or
//! a timeout ends the call without a retry, so records already handled are
//! not handed to the worker again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, info_span};

use commerce_core::Namespace;
use commerce_datastore::{Datastore, Query};

use crate::config::DispatchConfig;
use crate::error::BatchError;
use crate::request::{BatchRequest, BatchWindow, DispatchId};
use crate::warehouse::{RowBuffer, Warehouse, flush};
use crate::worker::{PageRun, WorkerDescriptor, WorkerVariant};

/// State of one batch execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Paging,
    Invoking,
    Done,
    AbortedOnError,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Done | BatchState::AbortedOnError)
    }
}

/// Outcome of one batch execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub dispatch_id: DispatchId,
    pub worker: String,
    pub namespace: Namespace,
    #[serde(flatten)]
    pub window: BatchWindow,
    pub state: BatchState,
    /// Records handed to the worker
    pub delivered: usize,
    /// Records not handed to the worker under the skip policy
    pub skipped: usize,
    /// Records decoded despite a field mismatch
    pub mismatched: usize,
    pub worker_failures: usize,
    pub rows_flushed: usize,
    pub error: Option<String>,
    /// Whether the abort is worth re-running the whole window for
    #[serde(default)]
    pub retryable: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn new(request: &BatchRequest) -> Self {
        Self {
            dispatch_id: request.dispatch_id,
            worker: request.worker.clone(),
            namespace: request.namespace.clone(),
            window: request.window,
            state: BatchState::Idle,
            delivered: 0,
            skipped: 0,
            mismatched: 0,
            worker_failures: 0,
            rows_flushed: 0,
            error: None,
            retryable: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state == BatchState::AbortedOnError
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }

    pub(crate) fn transition(&mut self, next: BatchState) {
        debug!(from = ?self.state, to = ?next, "batch state");
        self.state = next;
    }

    fn finish(&mut self, outcome: Result<(), BatchError>) {
        match outcome {
            Ok(()) => self.transition(BatchState::Done),
            Err(e) => {
                self.error = Some(e.to_string());
                self.retryable = e.is_retryable();
                self.transition(BatchState::AbortedOnError);
            }
        }
        self.finished_at = Some(Utc::now());
    }
}

/// Shared executing side of a dispatcher.
#[derive(Clone)]
pub(crate) struct Executor {
    pub(crate) datastore: Datastore,
    pub(crate) warehouse: Option<Arc<dyn Warehouse>>,
    pub(crate) config: DispatchConfig,
}

impl Executor {
    /// Run one batch of `descriptor` inside a span naming the batch.
    pub(crate) async fn execute(
        &self,
        descriptor: &WorkerDescriptor,
        request: BatchRequest,
    ) -> BatchReport {
        let span = info_span!(
            "batch",
            dispatch_id = %request.dispatch_id,
            worker = %request.worker,
            namespace = %request.namespace,
            offset = request.window.offset,
            limit = request.window.limit,
        );
        self.run(descriptor, request).instrument(span).await
    }

    async fn run(&self, descriptor: &WorkerDescriptor, request: BatchRequest) -> BatchReport {
        let mut report = BatchReport::new(&request);
        let db = self
            .datastore
            .with_namespace(request.namespace.clone())
            .with_request(request.request.clone());
        let query = Query::new(descriptor.kind())
            .offset(request.window.offset)
            .limit(request.window.limit);
        let rows = RowBuffer::new();
        let timeout = self.config.batch_timeout;

        let looped = {
            let report = &mut report;
            let run = PageRun {
                db: &db,
                params: &request.params,
                rows: &rows,
                policy: self.config.field_mismatch,
                worker: descriptor.name(),
            };
            let work = async move {
                report.transition(BatchState::Paging);
                let mut page = run.db.run(&query).await?;
                report.transition(BatchState::Invoking);
                descriptor.worker.run_page(run, &mut page, report).await
            };
            match tokio::time::timeout(timeout, work).await {
                Ok(result) => result,
                Err(_) => Err(BatchError::Timeout(timeout)),
            }
        };

        if let Err(e) = &looped {
            error!(error = %e, delivered = report.delivered, "batch aborted");
        }

        let flushed = match (&self.warehouse, descriptor.variant()) {
            (Some(warehouse), WorkerVariant::Warehouse) => match flush(warehouse.as_ref(), &rows).await {
                Ok(n) => {
                    report.rows_flushed = n;
                    Ok(())
                }
                Err(e) => {
                    report.rows_flushed = e.inserted;
                    Err(BatchError::from(e.error))
                }
            },
            _ => Ok(()),
        };

        // A lost flush outranks a loop abort, which was logged above.
        report.finish(flushed.and(looped));

        if report.is_aborted() {
            error!(
                delivered = report.delivered,
                worker_failures = report.worker_failures,
                rows_flushed = report.rows_flushed,
                error = report.error.as_deref().unwrap_or_default(),
                "batch finished with error"
            );
        } else {
            info!(
                delivered = report.delivered,
                skipped = report.skipped,
                mismatched = report.mismatched,
                worker_failures = report.worker_failures,
                rows_flushed = report.rows_flushed,
                duration_ms = report.duration_ms().unwrap_or_default(),
                "batch finished"
            );
        }
        report
    }
}
