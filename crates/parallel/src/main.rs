use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use commerce_core::{Entity, Key, Kind, Namespace, RequestSnapshot};
use commerce_datastore::{Datastore, InMemoryCollectionStore, Query};
use commerce_parallel::{
    DispatchConfig, DispatchContext, Destination, Dispatcher, InMemoryWarehouse, Migration, RowBuffer,
};
use commerce_tasks::InMemoryTaskQueue;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Order {
    #[serde(skip)]
    key: Option<Key>,
    status: String,
    total: i64,
    visits: u32,
}

impl Kind for Order {
    fn kind() -> &'static str {
        "order"
    }
}

impl Entity for Order {
    fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    fn set_key(&mut self, key: Key) {
        self.key = Some(key);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportTarget {
    project: String,
    suffix: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    commerce_observability::init();

    let config = DispatchConfig::from_env();
    let store = Arc::new(InMemoryCollectionStore::new());
    let queue = Arc::new(InMemoryTaskQueue::spawning());
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let dispatcher = Dispatcher::builder(Datastore::new(store.clone()), queue.clone())
        .config(config)
        .warehouse(warehouse.clone())
        .build();

    let tenants = [Namespace::new("acme")?, Namespace::new("globex")?];
    for (n, namespace) in tenants.iter().enumerate() {
        let db = Datastore::new(store.clone()).with_namespace(namespace.clone());
        for i in 0..(25 + n * 10) {
            let order = Order {
                status: if i % 3 == 0 { "refunded" } else { "paid" }.into(),
                total: (i as i64 + 1) * 250,
                ..Order::default()
            };
            db.put_by_key(&db.new_key("order", format!("{i:05}")), &order).await?;
        }
    }
    tracing::info!(records = store.len(), "seeded collection store");

    dispatcher.register("touch-order", |db: Datastore, mut order: Order, _: ()| async move {
        order.visits += 1;
        db.put(&order).await?;
        anyhow::Ok(())
    })?;
    dispatcher.register_warehouse(
        "export-orders",
        |_db: Datastore, order: Order, rows: RowBuffer, target: ExportTarget| async move {
            let table = format!("orders_{}_{}", order.status, target.suffix);
            rows.push(
                Destination::new(&target.project, "commerce", table),
                json!({"total": order.total, "status": order.status}),
            )?;
            anyhow::Ok(())
        },
    )?;

    let ctx = DispatchContext::new().with_request(RequestSnapshot::new().with("invoked_by", "parallel-demo"));
    let summary = dispatcher.run_all_default("touch-order", &ctx, &()).await?;
    tracing::info!(
        dispatch_id = %summary.dispatch_id,
        batches = summary.batches_enqueued(),
        records = summary.records_counted(),
        "touch-order dispatched"
    );

    let export = Migration::new("nightly-export", |_ctx: &mut DispatchContext| {
        Ok(ExportTarget {
            project: "analytics".into(),
            suffix: chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string(),
        })
    })
    .worker("export-orders");
    export.run(&dispatcher, &ctx, 10).await?;

    queue.drain().await?;

    for namespace in &tenants {
        let db = Datastore::new(store.clone()).with_namespace(namespace.clone());
        let mut page = db.run(&Query::new("order")).await?;
        let mut visited = 0;
        while let Some(loaded) = page.next::<Order>()? {
            if loaded.entity.visits > 0 {
                visited += 1;
            }
        }
        tracing::info!(namespace = %namespace, visited, "orders visited");
    }

    let stats = queue.stats();
    tracing::info!(
        enqueued = stats.enqueued,
        succeeded = stats.succeeded,
        dead_lettered = stats.dead_lettered,
        warehouse_inserts = warehouse.calls().len(),
        "demo complete"
    );
    Ok(())
}
