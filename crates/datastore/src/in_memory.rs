use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use commerce_core::{Key, Namespace};

use crate::error::StoreError;
use crate::query::Query;
use crate::store::{CollectionStore, RawRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CollectionKey {
    namespace: Namespace,
    kind: String,
}

/// In-memory namespaced collection store.
///
/// Intended for tests/dev. Records of one collection are kept in key order,
/// which is the natural page order offsets refer to.
#[derive(Debug, Default)]
pub struct InMemoryCollectionStore {
    collections: RwLock<HashMap<CollectionKey, BTreeMap<Key, RawRecord>>>,
    unavailable: AtomicBool,
}

impl InMemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a transport outage: every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Total records across all namespaces and kinds.
    pub fn len(&self) -> usize {
        self.collections
            .read()
            .map(|c| c.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("store unavailable".to_string()));
        }
        Ok(())
    }

    fn matching(&self, namespace: &Namespace, query: &Query) -> Result<Vec<(Key, RawRecord)>, StoreError> {
        self.ensure_available()?;
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let ck = CollectionKey {
            namespace: namespace.clone(),
            kind: query.kind().to_string(),
        };
        let Some(records) = collections.get(&ck) else {
            return Ok(Vec::new());
        };

        let matches = records
            .iter()
            .filter(|(k, r)| query.matches(k, r))
            .map(|(k, r)| (k.clone(), r.clone()));
        Ok(query.window(matches).collect())
    }
}

#[async_trait::async_trait]
impl CollectionStore for InMemoryCollectionStore {
    async fn count(&self, namespace: &Namespace, query: &Query) -> Result<usize, StoreError> {
        Ok(self.matching(namespace, query)?.len())
    }

    async fn fetch(
        &self,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<Vec<(Key, RawRecord)>, StoreError> {
        self.matching(namespace, query)
    }

    async fn get(&self, key: &Key) -> Result<Option<RawRecord>, StoreError> {
        self.ensure_available()?;
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let ck = CollectionKey {
            namespace: key.namespace().clone(),
            kind: key.kind().to_string(),
        };
        Ok(collections.get(&ck).and_then(|c| c.get(key)).cloned())
    }

    async fn put(&self, key: Key, record: RawRecord) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let ck = CollectionKey {
            namespace: key.namespace().clone(),
            kind: key.kind().to_string(),
        };
        collections.entry(ck).or_default().insert(key, record);
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let ck = CollectionKey {
            namespace: key.namespace().clone(),
            kind: key.kind().to_string(),
        };
        Ok(collections
            .get_mut(&ck)
            .map(|c| c.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        self.ensure_available()?;
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let set: BTreeSet<Namespace> = collections
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(ck, _)| ck.namespace.clone())
            .collect();
        Ok(set.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use commerce_core::Entity;
    use crate::datastore::Datastore;
    use crate::decode::tests::{Order, record};
    use crate::query::FilterOp;
    use serde_json::json;

    fn acme() -> Namespace {
        Namespace::new("acme").unwrap()
    }

    async fn seeded(n: usize) -> (Arc<InMemoryCollectionStore>, Datastore) {
        let store = Arc::new(InMemoryCollectionStore::new());
        let db = Datastore::new(store.clone()).with_namespace(acme());
        for i in 0..n {
            let key = db.new_key("order", format!("o{i:02}"));
            store
                .put(key, record(json!({"status": "open", "total": i, "count": 0})))
                .await
                .unwrap();
        }
        (store, db)
    }

    #[tokio::test]
    async fn count_respects_filters_offset_and_limit() {
        let (_store, db) = seeded(10).await;

        assert_eq!(db.count(&Query::new("order")).await.unwrap(), 10);
        assert_eq!(
            db.count(&Query::new("order").filter("total", FilterOp::Ge, 4)).await.unwrap(),
            6
        );
        assert_eq!(db.count(&Query::new("order").offset(8).limit(5)).await.unwrap(), 2);
        assert_eq!(db.count(&Query::new("user")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pages_are_disjoint_and_deterministic() {
        let (_store, db) = seeded(10).await;

        let mut seen = Vec::new();
        for offset in (0..10).step_by(3) {
            let q = Query::new("order").offset(offset).limit(3);
            let mut page = db.run(&q).await.unwrap();
            let mut again = db.run(&q).await.unwrap();
            while let Some(loaded) = page.next::<Order>().unwrap() {
                let replay = again.next::<Order>().unwrap().unwrap();
                assert_eq!(replay.key, loaded.key);
                seen.push(loaded.key);
            }
        }

        let unique: BTreeSet<_> = seen.iter().cloned().collect();
        assert_eq!(seen.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let (store, db) = seeded(3).await;
        let other = db.with_namespace(Namespace::new("globex").unwrap());

        assert_eq!(other.count(&Query::new("order")).await.unwrap(), 0);

        let foreign = db.new_key("order", "o00");
        let err = other.get::<Order>(&foreign).await.unwrap_err();
        assert!(matches!(err, StoreError::NamespaceMismatch { .. }));

        let names = store.namespaces().await.unwrap();
        assert_eq!(names, vec![acme()]);
    }

    #[tokio::test]
    async fn put_and_get_round_trip_through_handle() {
        let (_store, db) = seeded(1).await;
        let key = db.new_key("order", "o00");

        let mut order: Order = db.get(&key).await.unwrap().unwrap();
        assert_eq!(order.key(), Some(&key));
        order.count += 1;
        db.put(&order).await.unwrap();

        let reloaded: Order = db.get(&key).await.unwrap().unwrap();
        assert_eq!(reloaded.count, 1);
    }

    #[tokio::test]
    async fn put_requires_bound_key_of_matching_kind() {
        let (_store, db) = seeded(0).await;

        let err = db.put(&Order::default()).await.unwrap_err();
        assert_eq!(err, StoreError::MissingKey("order".into()));

        let err = db
            .put_by_key(&db.new_key("user", "u1"), &Order::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KindMismatch { .. }));
    }

    #[tokio::test]
    async fn ancestor_queries_scope_to_descendants() {
        let store = Arc::new(InMemoryCollectionStore::new());
        let db = Datastore::new(store.clone());
        let alice = db.new_key("user", "alice");
        let bob = db.new_key("user", "bob");
        for (i, parent) in [&alice, &alice, &bob].into_iter().enumerate() {
            let key = db.new_key("order", format!("o{i}")).with_parent(parent.clone());
            store.put(key, record(json!({"total": i}))).await.unwrap();
        }

        assert_eq!(db.count(&Query::new("order").ancestor(alice)).await.unwrap(), 2);
        assert_eq!(db.count(&Query::new("order").ancestor(bob)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let (store, db) = seeded(2).await;
        store.set_unavailable(true);

        assert!(matches!(
            db.count(&Query::new("order")).await,
            Err(StoreError::Storage(_))
        ));
        assert!(db.namespaces().await.is_err());

        store.set_unavailable(false);
        assert_eq!(db.count(&Query::new("order")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_shifts_later_windows() {
        let (_store, db) = seeded(4).await;
        let before: Vec<Key> = {
            let mut page = db.run(&Query::new("order").offset(2).limit(2)).await.unwrap();
            let mut keys = Vec::new();
            while let Some(l) = page.next::<Order>().unwrap() {
                keys.push(l.key);
            }
            keys
        };

        assert!(db.delete(&db.new_key("order", "o00")).await.unwrap());

        let mut page = db.run(&Query::new("order").offset(2).limit(2)).await.unwrap();
        let first = page.next::<Order>().unwrap().unwrap();
        assert_eq!(first.key, before[1]);
        assert!(page.next::<Order>().unwrap().is_none());
    }
}
