//! Tolerant decoding of stored records into entities.
//!
//! A record is overlaid onto the entity's default value: declared fields the
//! record carries are replaced, declared fields it lacks keep their defaults,
//! and fields the entity does not declare are dropped. A field counts as
//! declared when the default value or the decoded entity serializes it. Any disagreement about
//! *which* fields exist is reported as a [`FieldMismatch`] next to the decoded
//! entity. Disagreement about *values* (wrong JSON type for a declared field)
//! is a hard [`DecodeError::Malformed`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use commerce_core::Entity;

use crate::error::DecodeError;
use crate::store::RawRecord;

/// Fields present on only one side of a decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMismatch {
    pub kind: String,
    /// Stored fields the entity type does not declare.
    pub unknown: Vec<String>,
    /// Declared fields the stored record lacks.
    pub missing: Vec<String>,
}

impl core::fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "kind '{}' unknown fields {:?}, missing fields {:?}",
            self.kind, self.unknown, self.missing
        )
    }
}

/// Result of a tolerant decode.
#[derive(Debug, Clone)]
pub struct Decoded<E> {
    pub entity: E,
    pub mismatch: Option<FieldMismatch>,
}

impl<E> Decoded<E> {
    /// Reject any field mismatch (strict decoding).
    pub fn strict(self) -> Result<E, DecodeError> {
        match self.mismatch {
            Some(m) => Err(DecodeError::FieldMismatch(m)),
            None => Ok(self.entity),
        }
    }
}

/// Decode `record` into `E`, tolerating field mismatches.
pub fn decode<E: Entity>(record: &RawRecord) -> Result<Decoded<E>, DecodeError> {
    let kind = E::kind();
    let template = serde_json::to_value(E::default())
        .map_err(|e| DecodeError::malformed(kind, format!("default value does not serialize: {e}")))?;
    let JsonValue::Object(mut merged) = template else {
        return Err(DecodeError::malformed(
            kind,
            "entity does not serialize to a JSON object",
        ));
    };

    // Optional fields skipped while empty only appear on the decoded value.
    let mut declared: BTreeSet<String> = merged.keys().cloned().collect();
    let missing: Vec<String> = declared
        .iter()
        .filter(|field| !record.contains_key(*field))
        .cloned()
        .collect();
    for (field, value) in record {
        merged.insert(field.clone(), value.clone());
    }

    let entity: E = serde_json::from_value(JsonValue::Object(merged))
        .map_err(|e| DecodeError::malformed(kind, e.to_string()))?;

    if let Ok(JsonValue::Object(populated)) = serde_json::to_value(&entity) {
        declared.extend(populated.into_iter().map(|(field, _)| field));
    }
    let unknown: Vec<String> = record
        .keys()
        .filter(|field| !declared.contains(*field))
        .cloned()
        .collect();

    let mismatch = (!unknown.is_empty() || !missing.is_empty()).then(|| FieldMismatch {
        kind: kind.to_string(),
        unknown,
        missing,
    });

    Ok(Decoded { entity, mismatch })
}

/// Encode an entity into a stored record.
pub fn encode<E: Entity>(entity: &E) -> Result<RawRecord, DecodeError> {
    match serde_json::to_value(entity) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(DecodeError::malformed(
            E::kind(),
            "entity does not serialize to a JSON object",
        )),
        Err(e) => Err(DecodeError::malformed(E::kind(), e.to_string())),
    }
}
