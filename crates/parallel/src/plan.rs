//! Batch partitioning.

use std::num::NonZeroUsize;

use serde::Serialize;

use commerce_core::Namespace;

use crate::request::{BatchWindow, DispatchId};

/// Partition `[0, total)` into windows of `batch_size`.
///
/// Offsets step from 0 by `batch_size` while below `total`; every window
/// carries the full `batch_size` as its limit, so the last one may reach
/// past the end of the collection.
pub fn plan_batches(total: usize, batch_size: NonZeroUsize) -> Vec<BatchWindow> {
    let limit = batch_size.get();
    (0..total)
        .step_by(limit)
        .map(|offset| BatchWindow { offset, limit })
        .collect()
}

/// What one `run_all` call enqueued for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceDispatch {
    pub namespace: Namespace,
    /// Records counted before enqueuing
    pub total: usize,
    pub batches: usize,
}

/// Result of a `run_all` call: accepted batches, not completed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub dispatch_id: DispatchId,
    pub worker: String,
    pub batch_size: usize,
    pub namespaces: Vec<NamespaceDispatch>,
}

impl DispatchSummary {
    pub fn batches_enqueued(&self) -> usize {
        self.namespaces.iter().map(|n| n.batches).sum()
    }

    pub fn records_counted(&self) -> usize {
        self.namespaces.iter().map(|n| n.total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn ten_records_in_threes() {
        let windows = plan_batches(10, size(3));
        let offsets: Vec<_> = windows.iter().map(|w| w.offset).collect();
        let limits: Vec<_> = windows.iter().map(|w| w.limit).collect();

        assert_eq!(offsets, vec![0, 3, 6, 9]);
        assert_eq!(limits, vec![3, 3, 3, 3]);
    }

    #[test]
    fn empty_collection_plans_nothing() {
        assert!(plan_batches(0, size(50)).is_empty());
    }

    #[test]
    fn exact_multiple_has_no_trailing_window() {
        assert_eq!(plan_batches(9, size(3)).len(), 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn windows_partition_the_collection(total in 0usize..5_000, batch in 1usize..700) {
            let windows = plan_batches(total, size(batch));

            prop_assert_eq!(windows.len(), total.div_ceil(batch));

            let mut expected_offset = 0;
            for w in &windows {
                prop_assert_eq!(w.offset, expected_offset);
                prop_assert_eq!(w.limit, batch);
                expected_offset = w.end();
            }
            if let Some(last) = windows.last() {
                prop_assert!(last.offset < total);
                prop_assert!(last.end() >= total);
            }
        }
    }
}
