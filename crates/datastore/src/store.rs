use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use commerce_core::{Key, Namespace};

use crate::error::StoreError;
use crate::query::Query;

/// A stored record as the store sees it: field name → JSON value.
pub type RawRecord = Map<String, JsonValue>;

/// Namespaced, keyed collection store.
///
/// Records are grouped by kind (collection name) inside a namespace. The
/// store makes no ordering promise beyond "the same query over an unchanged
/// collection returns the same records in the same order", which is what
/// offset/limit paging relies on.
///
/// ## Consistency
///
/// There is no snapshot isolation across calls: a record inserted or deleted
/// between a `count` and a later `fetch` shifts offset windows. Callers that
/// partition a collection by offset accept that records may be skipped or
/// seen twice under concurrent mutation.
#[async_trait::async_trait]
pub trait CollectionStore: Send + Sync {
    /// Number of records in `namespace` matching the query's kind, filters and
    /// ancestor, after applying its offset and limit.
    async fn count(&self, namespace: &Namespace, query: &Query) -> Result<usize, StoreError>;

    /// Records matching the query, in natural page order.
    async fn fetch(
        &self,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<Vec<(Key, RawRecord)>, StoreError>;

    /// Load a single record by key.
    async fn get(&self, key: &Key) -> Result<Option<RawRecord>, StoreError>;

    /// Insert or replace the record stored under `key`.
    async fn put(&self, key: Key, record: RawRecord) -> Result<(), StoreError>;

    /// Remove the record stored under `key`. Returns whether it existed.
    async fn delete(&self, key: &Key) -> Result<bool, StoreError>;

    /// Every namespace currently holding at least one record.
    async fn namespaces(&self) -> Result<Vec<Namespace>, StoreError>;
}

#[async_trait::async_trait]
impl<S> CollectionStore for Arc<S>
where
    S: CollectionStore + ?Sized,
{
    async fn count(&self, namespace: &Namespace, query: &Query) -> Result<usize, StoreError> {
        (**self).count(namespace, query).await
    }

    async fn fetch(
        &self,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<Vec<(Key, RawRecord)>, StoreError> {
        (**self).fetch(namespace, query).await
    }

    async fn get(&self, key: &Key) -> Result<Option<RawRecord>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: Key, record: RawRecord) -> Result<(), StoreError> {
        (**self).put(key, record).await
    }

    async fn delete(&self, key: &Key) -> Result<bool, StoreError> {
        (**self).delete(key).await
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        (**self).namespaces().await
    }
}
