//! Parallel batch dispatcher.
//!
//! Fans a per-entity worker out over a collection in independently scheduled
//! batches:
//!
//! ```text
//! register worker ──▶ run_all: count per namespace ──▶ enqueue one call per window
//!                                                         │
//!                     task queue (later, maybe elsewhere) ◀┘
//!                                                         │
//!            batch executor: page [offset, offset+limit) ─┴─▶ worker(record) …
//!                                                         │
//!                     warehouse variant: grouped bulk inserts at batch end
//! ```
//!
//! Worker shapes are checked by the compiler. A routine whose first
//! parameter is not a [`Datastore`](commerce_datastore::Datastore) handle is
//! rejected at registration:
//!
//! ```compile_fail
//! # use commerce_parallel::Dispatcher;
//! # fn register(dispatcher: &Dispatcher) {
//! dispatcher.register("broken", |name: String, count: u32, params: ()| async move {
//!     Ok(())
//! });
//! # }
//! ```
//!
//! Delivery is best effort: batches are independent, may run in any order,
//! and concurrent writes to the collection can shift offset windows between
//! the count and a batch's page read. Workers must be idempotent.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod migration;
pub mod plan;
pub mod request;
pub mod warehouse;
pub mod worker;


pub use config::{DispatchConfig, FieldMismatchPolicy};
pub use context::DispatchContext;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{BatchError, ConfigError, DispatchError};
pub use executor::{BatchReport, BatchState};
pub use migration::Migration;
pub use plan::{DispatchSummary, NamespaceDispatch, plan_batches};
pub use request::{BatchRequest, BatchWindow, DispatchId};
pub use warehouse::{
    BufferedRow, Destination, FlushError, InMemoryWarehouse, InsertCall, RowBuffer, Warehouse, WarehouseError,
    flush, group_rows,
};
pub use worker::{WorkerDescriptor, WorkerFuture, WorkerParams, WorkerVariant};
