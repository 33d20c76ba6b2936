//! Worker registration and dispatch.
//!
//! The dispatcher owns the process-wide worker table. Registering a worker
//! validates it, stores its descriptor and registers a matching batch
//! callback with the task queue, so enqueued batch calls reach the right
//! executor by name.
//!
//! `run_all` runs inside the caller's task and only enqueues: it counts the
//! worker's collection in every target namespace, then enqueues one call per
//! batch window. It returns once the queue accepted every call, not when the
//! batches finished.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, info};

use commerce_core::{Entity, Key};
use commerce_datastore::{Datastore, Query};
use commerce_tasks::{TaskError, TaskQueue, task_handler};

use crate::config::DispatchConfig;
use crate::context::DispatchContext;
use crate::error::{ConfigError, DispatchError};
use crate::executor::{BatchReport, Executor};
use crate::plan::{DispatchSummary, NamespaceDispatch, plan_batches};
use crate::request::{BatchRequest, DispatchId};
use crate::warehouse::{RowBuffer, Warehouse};
use crate::worker::{Invoke, WorkerDescriptor, WorkerFuture, WorkerParams, WorkerVariant};

/// Builder for a [`Dispatcher`].
pub struct DispatcherBuilder {
    datastore: Datastore,
    queue: Arc<dyn TaskQueue>,
    warehouse: Option<Arc<dyn Warehouse>>,
    config: DispatchConfig,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Warehouse receiving rows of warehouse-variant workers.
    pub fn warehouse(mut self, warehouse: Arc<dyn Warehouse>) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            executor: Arc::new(Executor {
                datastore: self.datastore,
                warehouse: self.warehouse,
                config: self.config,
            }),
            queue: self.queue,
            workers: RwLock::new(HashMap::new()),
        }
    }
}

/// Fans workers out over collections in independently scheduled batches.
pub struct Dispatcher {
    executor: Arc<Executor>,
    queue: Arc<dyn TaskQueue>,
    workers: RwLock<HashMap<String, Arc<WorkerDescriptor>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.executor.config)
            .field("warehouse", &self.executor.warehouse.is_some())
            .field("workers", &self.worker_names())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// `datastore` is the base handle; batches re-scope it per namespace.
    pub fn builder(datastore: Datastore, queue: Arc<dyn TaskQueue>) -> DispatcherBuilder {
        DispatcherBuilder {
            datastore,
            queue,
            warehouse: None,
            config: DispatchConfig::default(),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.executor.config
    }

    pub fn datastore(&self) -> &Datastore {
        &self.executor.datastore
    }

    /// Register `worker`, invoked as `worker(db, entity, params)` with the
    /// record key already bound onto `entity`.
    pub fn register<E, P, F, Fut>(
        &self,
        name: &str,
        worker: F,
    ) -> Result<Arc<WorkerDescriptor>, ConfigError>
    where
        E: Entity,
        P: WorkerParams,
        F: Fn(Datastore, E, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.install(
            name,
            Invoke::Plain(Box::new(move |db: Datastore, entity: E, params: P| -> WorkerFuture {
                Box::pin(worker(db, entity, params))
            })),
        )
    }

    /// Register a key-aware `worker`, invoked as `worker(db, key, entity, params)`.
    pub fn register_keyed<E, P, F, Fut>(
        &self,
        name: &str,
        worker: F,
    ) -> Result<Arc<WorkerDescriptor>, ConfigError>
    where
        E: Entity,
        P: WorkerParams,
        F: Fn(Datastore, Key, E, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.install(
            name,
            Invoke::Keyed(Box::new(
                move |db: Datastore, key: Key, entity: E, params: P| -> WorkerFuture {
                    Box::pin(worker(db, key, entity, params))
                },
            )),
        )
    }

    /// Register a warehouse `worker`, invoked as `worker(db, entity, rows, params)`.
    /// Rows appended to `rows` are flushed when the batch ends.
    pub fn register_warehouse<E, P, F, Fut>(
        &self,
        name: &str,
        worker: F,
    ) -> Result<Arc<WorkerDescriptor>, ConfigError>
    where
        E: Entity,
        P: WorkerParams,
        F: Fn(Datastore, E, RowBuffer, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.install(
            name,
            Invoke::Warehouse(Box::new(
                move |db: Datastore, entity: E, rows: RowBuffer, params: P| -> WorkerFuture {
                    Box::pin(worker(db, entity, rows, params))
                },
            )),
        )
    }

    fn install<E, P>(
        &self,
        name: &str,
        invoke: Invoke<E, P>,
    ) -> Result<Arc<WorkerDescriptor>, ConfigError>
    where
        E: Entity,
        P: WorkerParams,
    {
        let descriptor = Arc::new(WorkerDescriptor::new(name, invoke)?);
        if descriptor.variant() == WorkerVariant::Warehouse && self.executor.warehouse.is_none() {
            return Err(ConfigError::WarehouseNotConfigured(name.to_string()));
        }

        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        if workers.contains_key(name) {
            return Err(ConfigError::DuplicateWorker(name.to_string()));
        }

        let executor = self.executor.clone();
        let registered = descriptor.clone();
        let handler = task_handler(move |payload| {
            let executor = executor.clone();
            let descriptor = registered.clone();
            async move {
                let request = match BatchRequest::from_payload(payload) {
                    Ok(request) => request,
                    Err(e) => {
                        error!(worker = descriptor.name(), error = %e, "rejecting batch payload");
                        return Err(TaskError::new(e.to_string()));
                    }
                };
                if request.worker != descriptor.name() {
                    return Err(TaskError::new(format!(
                        "batch for worker '{}' routed to '{}'",
                        request.worker,
                        descriptor.name()
                    )));
                }
                let report = executor.execute(&descriptor, request).await;
                if report.is_aborted() && report.retryable {
                    return Err(TaskError::new(report.error.unwrap_or_default()));
                }
                Ok(())
            }
        });

        self.queue
            .register(descriptor.task_name(), handler)
            .map_err(ConfigError::TaskRegistration)?;
        workers.insert(name.to_string(), descriptor.clone());

        info!(
            worker = name,
            kind = descriptor.kind(),
            entity = descriptor.entity_type(),
            variant = ?descriptor.variant(),
            task = descriptor.task_name(),
            "worker registered"
        );
        Ok(descriptor)
    }

    pub fn worker(&self, name: &str) -> Option<Arc<WorkerDescriptor>> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered worker names, sorted.
    pub fn worker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn descriptor(&self, name: &str) -> Result<Arc<WorkerDescriptor>, ConfigError> {
        self.worker(name)
            .ok_or_else(|| ConfigError::UnknownWorker(name.to_string()))
    }

    /// Enqueue one batch call per `batch_size` window of the worker's
    /// collection, in the context's namespace or in every namespace.
    ///
    /// Every target namespace is counted before anything is enqueued, so
    /// store errors fail the dispatch without side effects. A queue error
    /// while enqueuing is returned as is; calls accepted before it still run.
    pub async fn run_all<P: WorkerParams>(
        &self,
        name: &str,
        ctx: &DispatchContext,
        batch_size: usize,
        params: &P,
    ) -> Result<DispatchSummary, DispatchError> {
        let descriptor = self.descriptor(name)?;
        descriptor.check_params::<P>()?;
        let batch_size = self
            .executor
            .config
            .effective_batch_size(batch_size, ctx.test_mode)?;
        let params = serde_json::to_value(params)?;

        let datastore = &self.executor.datastore;
        let namespaces = match &ctx.namespace {
            Some(ns) => vec![ns.clone()],
            None => datastore.namespaces().await?,
        };

        let query = Query::new(descriptor.kind());
        let mut counted = Vec::with_capacity(namespaces.len());
        for namespace in namespaces {
            let total = datastore.with_namespace(namespace.clone()).count(&query).await?;
            counted.push((namespace, total));
        }

        let dispatch_id = DispatchId::new();
        let mut summary = DispatchSummary {
            dispatch_id,
            worker: name.to_string(),
            batch_size: batch_size.get(),
            namespaces: Vec::with_capacity(counted.len()),
        };

        for (namespace, total) in counted {
            let windows = plan_batches(total, batch_size);
            let batch_count = windows.len();
            for (batch_index, window) in windows.into_iter().enumerate() {
                let request = BatchRequest {
                    dispatch_id,
                    worker: name.to_string(),
                    namespace: namespace.clone(),
                    request: ctx.request.clone(),
                    window,
                    batch_index,
                    batch_count,
                    params: params.clone(),
                };
                let task_id = self
                    .queue
                    .enqueue(descriptor.task_name(), request.to_payload()?)
                    .await?;
                debug!(
                    dispatch_id = %dispatch_id,
                    task_id = %task_id,
                    namespace = %namespace,
                    offset = window.offset,
                    limit = window.limit,
                    "batch enqueued"
                );
            }

            info!(
                dispatch_id = %dispatch_id,
                worker = name,
                namespace = %namespace,
                total,
                batches = batch_count,
                batch_size = batch_size.get(),
                "namespace dispatched"
            );
            summary.namespaces.push(NamespaceDispatch {
                namespace,
                total,
                batches: batch_count,
            });
        }

        Ok(summary)
    }

    /// [`Dispatcher::run_all`] with the configured default batch size.
    pub async fn run_all_default<P: WorkerParams>(
        &self,
        name: &str,
        ctx: &DispatchContext,
        params: &P,
    ) -> Result<DispatchSummary, DispatchError> {
        let size = self.executor.config.default_batch_size;
        self.run_all(name, ctx, size, params).await
    }

    /// Execute one batch right here, bypassing the task queue.
    pub async fn execute_batch(&self, request: BatchRequest) -> Result<BatchReport, DispatchError> {
        let descriptor = self.descriptor(&request.worker)?;
        Ok(self.executor.execute(&descriptor, request).await)
    }
}
