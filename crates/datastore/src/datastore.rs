//! Namespace-scoped handle over a [`CollectionStore`].

use std::sync::Arc;

use commerce_core::{Entity, Key, Namespace, RequestSnapshot};

use crate::decode::{decode, encode};
use crate::error::StoreError;
use crate::page::Page;
use crate::query::Query;
use crate::store::CollectionStore;

/// Cheap-to-clone handle bound to one namespace and one request context.
///
/// The namespace is never mutated in place: [`Datastore::with_namespace`]
/// returns a new handle, so a handle threaded into a worker always reads and
/// writes the tenant it was created for.
#[derive(Clone)]
pub struct Datastore {
    store: Arc<dyn CollectionStore>,
    namespace: Namespace,
    request: Arc<RequestSnapshot>,
}

impl core::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Datastore")
            .field("namespace", &self.namespace)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl Datastore {
    /// Handle on the default namespace with an empty request context.
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            store,
            namespace: Namespace::default_namespace(),
            request: Arc::new(RequestSnapshot::new()),
        }
    }

    /// A handle scoped to `namespace`, sharing the same store.
    pub fn with_namespace(&self, namespace: Namespace) -> Self {
        Self {
            store: self.store.clone(),
            namespace,
            request: self.request.clone(),
        }
    }

    /// A handle carrying a restored request context.
    pub fn with_request(&self, request: RequestSnapshot) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            request: Arc::new(request),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    pub fn store(&self) -> &Arc<dyn CollectionStore> {
        &self.store
    }

    /// A key for `kind`/`id` in this handle's namespace.
    pub fn new_key(&self, kind: impl Into<String>, id: impl Into<String>) -> Key {
        Key::new(kind, id).in_namespace(self.namespace.clone())
    }

    pub async fn count(&self, query: &Query) -> Result<usize, StoreError> {
        self.store.count(&self.namespace, query).await
    }

    /// Fetch the query's window as a [`Page`].
    pub async fn run(&self, query: &Query) -> Result<Page, StoreError> {
        let rows = self.store.fetch(&self.namespace, query).await?;
        Ok(Page::new(rows))
    }

    /// Load and decode one entity, tolerating field mismatches.
    pub async fn get<E: Entity>(&self, key: &Key) -> Result<Option<E>, StoreError> {
        self.check_namespace(key)?;
        let Some(record) = self.store.get(key).await? else {
            return Ok(None);
        };
        let mut entity = decode::<E>(&record)?.entity;
        entity.set_key(key.clone());
        Ok(Some(entity))
    }

    /// Persist `entity` under `key`.
    pub async fn put_by_key<E: Entity>(&self, key: &Key, entity: &E) -> Result<(), StoreError> {
        self.check_namespace(key)?;
        if key.kind() != E::kind() {
            return Err(StoreError::KindMismatch {
                key: key.kind().to_string(),
                entity: E::kind().to_string(),
            });
        }
        let record = encode(entity)?;
        self.store.put(key.clone(), record).await
    }

    /// Persist `entity` under the key bound onto it.
    pub async fn put<E: Entity>(&self, entity: &E) -> Result<Key, StoreError> {
        let key = entity
            .key()
            .cloned()
            .ok_or_else(|| StoreError::MissingKey(E::kind().to_string()))?;
        self.put_by_key(&key, entity).await?;
        Ok(key)
    }

    pub async fn delete(&self, key: &Key) -> Result<bool, StoreError> {
        self.check_namespace(key)?;
        self.store.delete(key).await
    }

    /// Every namespace known to the underlying store.
    pub async fn namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        self.store.namespaces().await
    }

    fn check_namespace(&self, key: &Key) -> Result<(), StoreError> {
        if key.namespace() != &self.namespace {
            return Err(StoreError::NamespaceMismatch {
                key: key.namespace().clone(),
                handle: self.namespace.clone(),
            });
        }
        Ok(())
    }
}
