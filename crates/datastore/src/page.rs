//! Bounded page of records with lazy decoding.

use std::collections::VecDeque;

use tracing::warn;

use commerce_core::{Entity, Key};

use crate::decode::{FieldMismatch, decode};
use crate::error::DecodeError;
use crate::store::RawRecord;

/// A decoded record with its key already bound onto the entity.
#[derive(Debug, Clone)]
pub struct Loaded<E> {
    pub key: Key,
    pub entity: E,
    /// Present when the record was delivered despite a field mismatch.
    pub mismatch: Option<FieldMismatch>,
}

/// One offset/limit window of a collection.
///
/// Records are fetched up front and decoded one at a time by [`Page::next`].
/// The page is finite; `Ok(None)` is the explicit "no more records" signal
/// and is never confused with a decode failure.
#[derive(Debug, Clone, Default)]
pub struct Page {
    rows: VecDeque<(Key, RawRecord)>,
    yielded: usize,
}

impl Page {
    pub fn new(rows: Vec<(Key, RawRecord)>) -> Self {
        Self {
            rows: rows.into(),
            yielded: 0,
        }
    }

    /// Records not yet read.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Records already handed out by `next`.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Decode the next record into a fresh `E`.
    ///
    /// - `Ok(Some(_))`: a record, possibly best-effort populated (field
    ///   mismatches are logged and reported on [`Loaded::mismatch`]).
    /// - `Ok(None)`: the page is exhausted.
    /// - `Err(_)`: a non-tolerated decode error; the failing record is
    ///   consumed and callers should stop reading this page.
    pub fn next<E: Entity>(&mut self) -> Result<Option<Loaded<E>>, DecodeError> {
        let Some((key, record)) = self.rows.pop_front() else {
            return Ok(None);
        };
        self.yielded += 1;

        let decoded = decode::<E>(&record)?;
        if let Some(m) = &decoded.mismatch {
            warn!(
                kind = E::kind(),
                key = %key,
                unknown = ?m.unknown,
                missing = ?m.missing,
                "ignoring field mismatch while decoding record"
            );
        }

        let mut entity = decoded.entity;
        entity.set_key(key.clone());

        Ok(Some(Loaded {
            key,
            entity,
            mismatch: decoded.mismatch,
        }))
    }
}
