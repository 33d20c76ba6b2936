//! Collection store boundary: namespaced, keyed records grouped by kind.
//!
//! This crate defines the storage-facing abstraction the batch dispatcher
//! iterates ([`CollectionStore`]), a namespace-scoped handle on top of it
//! ([`Datastore`]), query building, tolerant record decoding and the page
//! reader that signals exhaustion distinctly from errors.

pub mod datastore;
pub mod decode;
pub mod error;
pub mod in_memory;
pub mod page;
pub mod query;
pub mod store;

pub use datastore::Datastore;
pub use decode::{Decoded, FieldMismatch, decode, encode};
pub use error::{DecodeError, StoreError};
pub use in_memory::InMemoryCollectionStore;
pub use page::{Loaded, Page};
pub use query::{Filter, FilterOp, Query};
pub use store::{CollectionStore, RawRecord};
