use commerce_core::{DomainError, Namespace};
use thiserror::Error;

use crate::decode::FieldMismatch;

/// Record decoding error.
///
/// ## Classification
///
/// - **FieldMismatch**: the stored record and the entity type disagree on
///   which fields exist. Tolerated by readers: the entity is still produced,
///   best-effort populated.
/// - **Malformed**: anything else (wrong value types, non-object payloads).
///   Readers abort the remainder of the page.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("field mismatch: {0}")]
    FieldMismatch(FieldMismatch),

    #[error("malformed '{kind}' record: {reason}")]
    Malformed { kind: String, reason: String },
}

impl DecodeError {
    pub fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Whether readers may continue past this error.
    pub fn is_tolerated(&self) -> bool {
        matches!(self, DecodeError::FieldMismatch(_))
    }
}

/// Collection store operation error.
///
/// These are **infrastructure errors** (transport, isolation, encoding), as
/// opposed to the per-record decode classification above.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("namespace isolation violation: key in '{key}' used through handle for '{handle}'")]
    NamespaceMismatch { key: Namespace, handle: Namespace },

    #[error("entity of kind '{0}' has no key bound")]
    MissingKey(String),

    #[error("key kind '{key}' does not match entity kind '{entity}'")]
    KindMismatch { key: String, entity: String },

    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    InvalidId(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),
}
