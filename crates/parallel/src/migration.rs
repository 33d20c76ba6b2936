//! Migrations: one setup hook fanned out over several registered workers.

use std::sync::Arc;

use tracing::info;

use crate::context::DispatchContext;
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, DispatchError};
use crate::plan::DispatchSummary;
use crate::worker::WorkerParams;

type SetupFn<P> = Arc<dyn Fn(&mut DispatchContext) -> anyhow::Result<P> + Send + Sync>;

/// Named group of workers sharing one parameter value.
///
/// `setup` runs once per [`Migration::run`]. It may re-scope the context (for
/// example pin a namespace) and returns the value every member worker
/// receives, such as a destination project and a timestamped table suffix.
pub struct Migration<P> {
    name: String,
    setup: SetupFn<P>,
    workers: Vec<String>,
}

impl<P> std::fmt::Debug for Migration<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl<P: WorkerParams> Migration<P> {
    pub fn new<F>(name: impl Into<String>, setup: F) -> Self
    where
        F: Fn(&mut DispatchContext) -> anyhow::Result<P> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            setup: Arc::new(setup),
            workers: Vec::new(),
        }
    }

    /// Add a registered worker to the migration.
    pub fn worker(mut self, name: impl Into<String>) -> Self {
        self.workers.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    /// Check every member, run setup once, then `run_all` each member.
    ///
    /// Members are validated before setup runs, so a misconfigured migration
    /// enqueues nothing.
    pub async fn run(
        &self,
        dispatcher: &Dispatcher,
        ctx: &DispatchContext,
        batch_size: usize,
    ) -> Result<Vec<DispatchSummary>, DispatchError> {
        if self.workers.is_empty() {
            return Err(ConfigError::EmptyMigration(self.name.clone()).into());
        }
        for name in &self.workers {
            dispatcher
                .worker(name)
                .ok_or_else(|| ConfigError::UnknownWorker(name.clone()))?
                .check_params::<P>()?;
        }

        let mut ctx = ctx.clone();
        let params = (self.setup)(&mut ctx).map_err(|e| DispatchError::Setup(format!("{e:#}")))?;

        let mut summaries = Vec::with_capacity(self.workers.len());
        for name in &self.workers {
            summaries.push(dispatcher.run_all(name, &ctx, batch_size, &params).await?);
        }

        info!(
            migration = %self.name,
            workers = self.workers.len(),
            batches = summaries.iter().map(DispatchSummary::batches_enqueued).sum::<usize>(),
            "migration dispatched"
        );
        Ok(summaries)
    }
}
