//! Typed worker contracts and their registered descriptors.
//!
//! A worker is an async routine invoked once per record. Its shape is fixed
//! by the registration method used, so the compiler checks what would
//! otherwise be validated by inspecting the routine at registration time:
//!
//! | variant | routine |
//! |---|---|
//! | plain | `Fn(Datastore, E, P)` |
//! | key-aware | `Fn(Datastore, Key, E, P)` |
//! | warehouse | `Fn(Datastore, E, RowBuffer, P)` |
//!
//! `E` is the [`Entity`] whose kind names the collection; `P` is a
//! serializable parameter value supplied at dispatch time.

use std::any::TypeId;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, error};

use commerce_core::{Entity, Key};
use commerce_datastore::{Datastore, Page};

use crate::config::FieldMismatchPolicy;
use crate::error::{BatchError, ConfigError};
use crate::executor::BatchReport;
use crate::warehouse::RowBuffer;

/// Future returned by a worker routine.
pub type WorkerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Parameters passed by value to every worker call of a dispatch.
pub trait WorkerParams: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> WorkerParams for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerVariant {
    Plain,
    Keyed,
    Warehouse,
}

impl WorkerVariant {
    /// Name of the task-queue callback running batches of `worker`.
    pub fn task_name(&self, worker: &str) -> String {
        match self {
            WorkerVariant::Warehouse => format!("parallel-warehouse-fn-{worker}"),
            WorkerVariant::Plain | WorkerVariant::Keyed => format!("parallel-fn-{worker}"),
        }
    }
}

pub(crate) type PlainFn<E, P> = Box<dyn Fn(Datastore, E, P) -> WorkerFuture + Send + Sync>;
pub(crate) type KeyedFn<E, P> = Box<dyn Fn(Datastore, Key, E, P) -> WorkerFuture + Send + Sync>;
pub(crate) type WarehouseFn<E, P> = Box<dyn Fn(Datastore, E, RowBuffer, P) -> WorkerFuture + Send + Sync>;

pub(crate) enum Invoke<E, P> {
    Plain(PlainFn<E, P>),
    Keyed(KeyedFn<E, P>),
    Warehouse(WarehouseFn<E, P>),
}

impl<E, P> Invoke<E, P> {
    fn variant(&self) -> WorkerVariant {
        match self {
            Invoke::Plain(_) => WorkerVariant::Plain,
            Invoke::Keyed(_) => WorkerVariant::Keyed,
            Invoke::Warehouse(_) => WorkerVariant::Warehouse,
        }
    }
}

/// Everything a page run needs besides the page itself.
pub(crate) struct PageRun<'a> {
    pub db: &'a Datastore,
    pub params: &'a JsonValue,
    pub rows: &'a RowBuffer,
    pub policy: FieldMismatchPolicy,
    pub worker: &'a str,
}

/// Type-erased per-record loop of one registered worker.
#[async_trait::async_trait]
pub(crate) trait ErasedWorker: Send + Sync {
    /// Decode each record of `page` and invoke the worker on it.
    ///
    /// Worker errors are counted and logged; decode errors other than field
    /// mismatches end the page with an error.
    async fn run_page(
        &self,
        run: PageRun<'_>,
        page: &mut Page,
        report: &mut BatchReport,
    ) -> Result<(), BatchError>;
}

pub(crate) struct TypedWorker<E, P> {
    invoke: Invoke<E, P>,
}

impl<E, P> TypedWorker<E, P> {
    pub(crate) fn new(invoke: Invoke<E, P>) -> Self {
        Self { invoke }
    }
}

#[async_trait::async_trait]
impl<E, P> ErasedWorker for TypedWorker<E, P>
where
    E: Entity,
    P: WorkerParams,
{
    async fn run_page(
        &self,
        run: PageRun<'_>,
        page: &mut Page,
        report: &mut BatchReport,
    ) -> Result<(), BatchError> {
        let params: P = serde_json::from_value(run.params.clone())
            .map_err(|e| BatchError::Params(e.to_string()))?;

        while let Some(loaded) = page.next::<E>()? {
            if loaded.mismatch.is_some() {
                report.mismatched += 1;
                if run.policy == FieldMismatchPolicy::Skip {
                    report.skipped += 1;
                    debug!(key = %loaded.key, "skipping record with field mismatch");
                    continue;
                }
            }

            let key = loaded.key;
            let call = match &self.invoke {
                Invoke::Plain(f) => f(run.db.clone(), loaded.entity, params.clone()),
                Invoke::Keyed(f) => f(run.db.clone(), key.clone(), loaded.entity, params.clone()),
                Invoke::Warehouse(f) => {
                    f(run.db.clone(), loaded.entity, run.rows.clone(), params.clone())
                }
            };
            report.delivered += 1;

            if let Err(e) = call.await {
                report.worker_failures += 1;
                let message = format!("{e:#}");
                error!(worker = run.worker, key = %key, error = %message, "worker failed");
            }
        }
        Ok(())
    }
}

/// A registered worker. Immutable once registered.
pub struct WorkerDescriptor {
    name: String,
    kind: &'static str,
    entity_type: &'static str,
    params_type: TypeId,
    params_type_name: &'static str,
    variant: WorkerVariant,
    task_name: String,
    pub(crate) worker: Box<dyn ErasedWorker>,
}

impl std::fmt::Debug for WorkerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("entity_type", &self.entity_type)
            .field("params_type", &self.params_type_name)
            .field("variant", &self.variant)
            .field("task_name", &self.task_name)
            .finish_non_exhaustive()
    }
}

impl WorkerDescriptor {
    /// Validate and describe a worker.
    pub(crate) fn new<E, P>(name: &str, invoke: Invoke<E, P>) -> Result<Self, ConfigError>
    where
        E: Entity,
        P: WorkerParams,
    {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidWorkerName(name.to_string()));
        }
        let kind = E::kind();
        if kind.trim().is_empty() {
            return Err(ConfigError::EmptyKind {
                worker: name.to_string(),
                entity: std::any::type_name::<E>(),
            });
        }

        let variant = invoke.variant();
        Ok(Self {
            name: name.to_string(),
            kind,
            entity_type: std::any::type_name::<E>(),
            params_type: TypeId::of::<P>(),
            params_type_name: std::any::type_name::<P>(),
            variant,
            task_name: variant.task_name(name),
            worker: Box::new(TypedWorker::new(invoke)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection the worker iterates.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn params_type(&self) -> &'static str {
        self.params_type_name
    }

    pub fn variant(&self) -> WorkerVariant {
        self.variant
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Reject dispatch parameters of a different type than registered.
    pub fn check_params<P: 'static>(&self) -> Result<(), ConfigError> {
        if TypeId::of::<P>() != self.params_type {
            return Err(ConfigError::ParamsType {
                worker: self.name.clone(),
                expected: self.params_type_name,
                actual: std::any::type_name::<P>(),
            });
        }
        Ok(())
    }
}
