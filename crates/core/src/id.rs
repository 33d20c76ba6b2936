//! Strongly-typed identifiers for namespaced, keyed records.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Longest namespace name accepted by the collection store.
pub const MAX_NAMESPACE_LEN: usize = 100;

/// Tenant namespace (multi-tenant boundary of the collection store).
///
/// The empty namespace is the default one. Names are limited to
/// `[0-9A-Za-z._-]` and at most [`MAX_NAMESPACE_LEN`] characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a namespace name.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.len() > MAX_NAMESPACE_LEN {
            return Err(DomainError::invalid_id(format!(
                "namespace longer than {MAX_NAMESPACE_LEN} characters"
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(DomainError::invalid_id(format!(
                "namespace '{name}' contains invalid character '{c}'"
            )));
        }
        Ok(Self(name))
    }

    /// The default (unnamed) namespace.
    pub fn default_namespace() -> Self {
        Self(String::new())
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Namespace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_default() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl FromStr for Namespace {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Persistent key of a record: namespace, kind, id and an optional parent.
///
/// Keys order by `(namespace, kind, id, parent)`, which is also the natural
/// page order of the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    namespace: Namespace,
    kind: String,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<Box<Key>>,
}

impl Key {
    /// Create a root key in the default namespace.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::default_namespace(),
            kind: kind.into(),
            id: id.into(),
            parent: None,
        }
    }

    /// Move the key (and its ancestors) into `namespace`.
    pub fn in_namespace(mut self, namespace: Namespace) -> Self {
        self.parent = self
            .parent
            .map(|p| Box::new((*p).in_namespace(namespace.clone())));
        self.namespace = namespace;
        self
    }

    /// Attach a parent key. The child inherits the parent's namespace.
    pub fn with_parent(mut self, parent: Key) -> Self {
        self.namespace = parent.namespace.clone();
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// True when `ancestor` is this key or appears in its parent chain.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = k.parent();
        }
        false
    }
}

impl core::fmt::Display for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent}/")?;
        } else if !self.namespace.is_default() {
            write!(f, "{}:", self.namespace)?;
        }
        write!(f, "{}({})", self.kind, self.id)
    }
}
