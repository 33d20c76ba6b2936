//! Entity traits: collection naming + key binding.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::id::Key;

/// Capability of naming the collection ("kind") a type is stored under.
pub trait Kind {
    /// Collection name, e.g. `"order"`.
    fn kind() -> &'static str;
}

/// A record type the collection store can decode and the dispatcher can hand
/// to workers.
///
/// ## Decoding
///
/// Stored records are decoded through serde on top of `Default::default()`,
/// so fields the stored record lacks keep their default value. The set of
/// fields the entity *declares* is whatever its default value serializes to;
/// mark the key field `#[serde(skip)]` so it is never part of the payload.
///
/// ## Usage Pattern
///
/// ```ignore
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Order {
///     #[serde(skip)]
///     key: Option<Key>,
///     total: i64,
/// }
///
/// impl Kind for Order {
///     fn kind() -> &'static str { "order" }
/// }
///
/// impl Entity for Order {
///     fn key(&self) -> Option<&Key> { self.key.as_ref() }
///     fn set_key(&mut self, key: Key) { self.key = Some(key) }
/// }
/// ```
pub trait Entity: Kind + Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The persistent key bound onto this instance, if any.
    fn key(&self) -> Option<&Key>;

    /// Bind the record's persistent key onto this instance.
    fn set_key(&mut self, key: Key);
}
