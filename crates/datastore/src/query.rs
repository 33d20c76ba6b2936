//! Query building for a single collection.
//!
//! Queries are plain values: every builder method returns a new query, so a
//! base query can be reused to derive per-batch windows.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use commerce_core::Key;

use crate::store::RawRecord;

/// Comparison operator of a property filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Property filter: `field <op> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

impl Filter {
    /// Whether a stored record satisfies this filter.
    ///
    /// Records lacking the field never match. Ordering comparisons only
    /// apply between two numbers or two strings.
    pub fn matches(&self, record: &RawRecord) -> bool {
        let Some(stored) = record.get(&self.field) else {
            return false;
        };

        if self.op == FilterOp::Eq {
            return values_equal(stored, &self.value);
        }

        let Some(ord) = compare(stored, &self.value) else {
            return false;
        };
        match self.op {
            FilterOp::Lt => ord == Ordering::Less,
            FilterOp::Le => ord != Ordering::Greater,
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Ge | FilterOp::Eq => ord != Ordering::Less,
        }
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Query over one named collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    kind: String,
    filters: Vec<Filter>,
    ancestor: Option<Key>,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    /// Unfiltered query over every record of `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filters: Vec::new(),
            ancestor: None,
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<JsonValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Restrict results to descendants of `ancestor` (inclusive).
    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn offset_value(&self) -> usize {
        self.offset
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Whether a stored record matches kind, ancestor and filters
    /// (offset/limit are applied by [`Query::window`]).
    pub fn matches(&self, key: &Key, record: &RawRecord) -> bool {
        key.kind() == self.kind
            && self.ancestor.as_ref().is_none_or(|a| key.has_ancestor(a))
            && self.filters.iter().all(|f| f.matches(record))
    }

    /// Apply offset and limit to an ordered sequence of matches.
    pub fn window<T>(&self, matches: impl IntoIterator<Item = T>) -> impl Iterator<Item = T> {
        matches
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
    }
}
