//! Warehouse output aggregation.
//!
//! Workers of the warehouse variant append rows to a batch-scoped
//! [`RowBuffer`]. After the per-record loop the executor groups the rows by
//! [`Destination`] and issues one bulk insert per destination.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error};

/// Destination table identity: project, dataset and table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl Destination {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedRow {
    pub destination: Destination,
    pub payload: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WarehouseError {
    #[error("bulk insert into {destination} failed: {reason}")]
    Insert {
        destination: Destination,
        reason: String,
    },
    #[error("row does not encode: {0}")]
    Encode(String),
    #[error("row buffer unavailable")]
    Poisoned,
}

/// A flush that stopped at a failing destination group.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error} ({inserted} rows inserted before the failure)")]
pub struct FlushError {
    /// Rows of earlier groups that reached the warehouse
    pub inserted: usize,
    #[source]
    pub error: WarehouseError,
}

/// Batch-scoped accumulator shared with every worker call of one batch.
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    rows: Arc<Mutex<Vec<BufferedRow>>>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row for `destination`.
    pub fn push(&self, destination: Destination, payload: JsonValue) -> Result<(), WarehouseError> {
        self.rows
            .lock()
            .map_err(|_| WarehouseError::Poisoned)?
            .push(BufferedRow {
                destination,
                payload,
            });
        Ok(())
    }

    /// Append one serializable row for `destination`.
    pub fn push_row<T: Serialize>(&self, destination: Destination, row: &T) -> Result<(), WarehouseError> {
        let payload = serde_json::to_value(row).map_err(|e| WarehouseError::Encode(e.to_string()))?;
        self.push(destination, payload)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every buffered row.
    pub fn take(&self) -> Result<Vec<BufferedRow>, WarehouseError> {
        let mut rows = self.rows.lock().map_err(|_| WarehouseError::Poisoned)?;
        Ok(std::mem::take(&mut *rows))
    }
}

/// Analytical warehouse receiving grouped bulk inserts.
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    async fn bulk_insert(
        &self,
        destination: &Destination,
        rows: Vec<JsonValue>,
    ) -> Result<(), WarehouseError>;
}

#[async_trait::async_trait]
impl<W> Warehouse for Arc<W>
where
    W: Warehouse + ?Sized,
{
    async fn bulk_insert(
        &self,
        destination: &Destination,
        rows: Vec<JsonValue>,
    ) -> Result<(), WarehouseError> {
        (**self).bulk_insert(destination, rows).await
    }
}

/// Group rows by destination, keeping emission order within each group.
pub fn group_rows(rows: Vec<BufferedRow>) -> BTreeMap<Destination, Vec<JsonValue>> {
    let mut groups: BTreeMap<Destination, Vec<JsonValue>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.destination).or_default().push(row.payload);
    }
    groups
}

/// Drain `buffer` into `warehouse`, one bulk insert per destination.
///
/// Groups are inserted in destination order. The first failing insert stops
/// the flush; rows of later groups are dropped with the batch. Returns the
/// number of rows inserted, also on failure.
pub async fn flush(warehouse: &dyn Warehouse, buffer: &RowBuffer) -> Result<usize, FlushError> {
    let rows = buffer
        .take()
        .map_err(|error| FlushError { inserted: 0, error })?;
    let mut inserted = 0;
    for (destination, rows) in group_rows(rows) {
        let count = rows.len();
        match warehouse.bulk_insert(&destination, rows).await {
            Ok(()) => {
                debug!(destination = %destination, rows = count, "bulk insert complete");
                inserted += count;
            }
            Err(error) => {
                error!(destination = %destination, rows = count, error = %error, inserted, "bulk insert failed");
                return Err(FlushError { inserted, error });
            }
        }
    }
    Ok(inserted)
}

/// One recorded bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCall {
    pub destination: Destination,
    pub rows: Vec<JsonValue>,
}

/// In-memory warehouse for tests/dev: records every bulk insert.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    calls: Mutex<Vec<InsertCall>>,
    failing: Mutex<Vec<Destination>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert into `destination` fail.
    pub fn fail_on(&self, destination: Destination) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(destination);
        }
    }

    /// Successful inserts, in call order.
    pub fn calls(&self) -> Vec<InsertCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every row inserted into `destination`.
    pub fn rows_for(&self, destination: &Destination) -> Vec<JsonValue> {
        self.calls()
            .into_iter()
            .filter(|c| &c.destination == destination)
            .flat_map(|c| c.rows)
            .collect()
    }
}

#[async_trait::async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn bulk_insert(
        &self,
        destination: &Destination,
        rows: Vec<JsonValue>,
    ) -> Result<(), WarehouseError> {
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(destination))
            .map_err(|_| WarehouseError::Poisoned)?;
        if failing {
            return Err(WarehouseError::Insert {
                destination: destination.clone(),
                reason: "destination rejected the insert".to_string(),
            });
        }

        self.calls
            .lock()
            .map_err(|_| WarehouseError::Poisoned)?
            .push(InsertCall {
                destination: destination.clone(),
                rows,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn dest(table: &str) -> Destination {
        Destination::new("p", "d", table)
    }

    #[tokio::test]
    async fn one_insert_per_destination() {
        let warehouse = InMemoryWarehouse::new();
        let buffer = RowBuffer::new();
        buffer.push(dest("t1"), json!({"n": 1})).unwrap();
        buffer.push(dest("t2"), json!({"n": 2})).unwrap();
        buffer.push(dest("t1"), json!({"n": 3})).unwrap();

        let inserted = flush(&warehouse, &buffer).await.unwrap();

        assert_eq!(inserted, 3);
        let calls = warehouse.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(warehouse.rows_for(&dest("t1")), vec![json!({"n": 1}), json!({"n": 3})]);
        assert_eq!(warehouse.rows_for(&dest("t2")), vec![json!({"n": 2})]);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn empty_buffer_issues_no_inserts() {
        let warehouse = InMemoryWarehouse::new();
        assert_eq!(flush(&warehouse, &RowBuffer::new()).await.unwrap(), 0);
        assert!(warehouse.calls().is_empty());
    }

    #[tokio::test]
    async fn failing_group_stops_the_flush() {
        let warehouse = InMemoryWarehouse::new();
        warehouse.fail_on(dest("t1"));
        let buffer = RowBuffer::new();
        buffer.push(dest("t1"), json!(1)).unwrap();
        buffer.push(dest("t2"), json!(2)).unwrap();

        let err = flush(&warehouse, &buffer).await.unwrap_err();

        assert!(matches!(err.error, WarehouseError::Insert { ref destination, .. } if destination == &dest("t1")));
        assert_eq!(err.inserted, 0);
        assert!(warehouse.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_flush_reports_rows_already_inserted() {
        let warehouse = InMemoryWarehouse::new();
        warehouse.fail_on(dest("t2"));
        let buffer = RowBuffer::new();
        buffer.push(dest("t1"), json!(1)).unwrap();
        buffer.push(dest("t1"), json!(2)).unwrap();
        buffer.push(dest("t2"), json!(3)).unwrap();
        buffer.push(dest("t3"), json!(4)).unwrap();

        let err = flush(&warehouse, &buffer).await.unwrap_err();

        assert_eq!(err.inserted, 2);
        assert_eq!(warehouse.rows_for(&dest("t1")), vec![json!(1), json!(2)]);
        assert!(warehouse.rows_for(&dest("t3")).is_empty());
    }

    #[test]
    fn push_row_serializes() {
        #[derive(Serialize)]
        struct Row {
            id: &'static str,
            total: i64,
        }

        let buffer = RowBuffer::new();
        buffer.push_row(dest("orders"), &Row { id: "o1", total: 9 }).unwrap();

        let rows = buffer.take().unwrap();
        assert_eq!(rows[0].payload, json!({"id": "o1", "total": 9}));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn grouping_preserves_membership_regardless_of_order(
            tables in proptest::collection::vec(0u8..4, 0..40),
            seed in any::<u64>(),
        ) {
            let rows: Vec<BufferedRow> = tables
                .iter()
                .enumerate()
                .map(|(i, t)| BufferedRow { destination: dest(&format!("t{t}")), payload: json!(i) })
                .collect();

            let mut shuffled = rows.clone();
            // Deterministic rotation as a cheap reordering.
            if !shuffled.is_empty() {
                let k = (seed as usize) % shuffled.len();
                shuffled.rotate_left(k);
            }

            let a = group_rows(rows);
            let b = group_rows(shuffled);

            let distinct: std::collections::BTreeSet<_> = tables.iter().collect();
            prop_assert_eq!(a.len(), distinct.len());
            prop_assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
            for (destination, rows) in &a {
                let mut left = rows.iter().map(|v| v.as_u64()).collect::<Vec<_>>();
                let mut right = b[destination].iter().map(|v| v.as_u64()).collect::<Vec<_>>();
                left.sort();
                right.sort();
                prop_assert_eq!(left, right);
            }
            let total: usize = a.values().map(Vec::len).sum();
            prop_assert_eq!(total, tables.len());
        }
    }
}
