//! Per-left-chunk accumulation of partial sums.
//!
//! A `PartialProduct` maps `(row, col)` to a running sum. The kernel emits one per
//! chunk pair; the orchestrator folds those into a single `PartialProduct` per left
//! chunk, so a key that recurs in several right chunks is summed rather than written
//! twice. The inner chunk size therefore has no effect on what a left chunk emits.

use crate::types::{CooChunk, CooEntry};
use ahash::AHashMap;

#[derive(Debug, Clone, Default)]
pub struct PartialProduct {
    sums: AHashMap<(i64, i64), f64>,
}

impl PartialProduct {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sums: AHashMap::with_capacity(capacity),
        }
    }

    /// Adds `value` to the sum held for `(row, col)`, creating the key if absent.
    #[inline]
    pub fn add(&mut self, row: i64, col: i64, value: f64) {
        *self.sums.entry((row, col)).or_insert(0.0) += value;
    }

    pub fn get(&self, row: i64, col: i64) -> Option<f64> {
        self.sums.get(&(row, col)).copied()
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    pub(crate) fn divide_by(&mut self, divisor: f64) {
        for value in self.sums.values_mut() {
            *value /= divisor;
        }
    }

    /// Folds `joined` into this partial result, summing keys present in both.
    pub fn accumulate(&mut self, joined: PartialProduct) {
        if self.sums.is_empty() {
            self.sums = joined.sums;
            return;
        }
        self.sums.reserve(joined.sums.len());
        for (key, value) in joined.sums {
            *self.sums.entry(key).or_insert(0.0) += value;
        }
    }

    /// Folds raw COO entries into this partial result.
    pub fn accumulate_entries(&mut self, entries: &CooChunk) {
        for entry in entries.iter() {
            self.add(entry.row, entry.col, entry.val);
        }
    }

    /// Drains the sums into a chunk ordered by `(row, col)`.
    ///
    /// Hash iteration order is not stable between processes; sorting makes the output
    /// order a function of the inputs and chunk sizes only.
    pub fn into_sorted_chunk(self) -> CooChunk {
        let mut entries: Vec<((i64, i64), f64)> = self.sums.into_iter().collect();
        entries.sort_unstable_by_key(|&(key, _)| key);
        entries
            .into_iter()
            .map(|((row, col), val)| CooEntry { row, col, val })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(entries: &[(i64, i64, f64)]) -> PartialProduct {
        let mut product = PartialProduct::default();
        for &(row, col, val) in entries {
            product.add(row, col, val);
        }
        product
    }

    #[test]
    fn recurring_keys_are_summed() {
        let mut partial = product(&[(0, 0, 1.5), (2, 1, 4.0)]);
        partial.accumulate(product(&[(0, 0, 2.5), (3, 3, 1.0)]));
        partial.accumulate(product(&[(2, 1, -4.0)]));

        assert_eq!(partial.len(), 3);
        assert_eq!(partial.get(0, 0), Some(4.0));
        assert_eq!(partial.get(2, 1), Some(0.0));
        assert_eq!(partial.get(3, 3), Some(1.0));
    }

    #[test]
    fn accumulating_into_empty_takes_the_join_result() {
        let mut partial = PartialProduct::default();
        partial.accumulate(product(&[(5, 6, 7.0)]));
        assert_eq!(partial.get(5, 6), Some(7.0));
        partial.accumulate(PartialProduct::default());
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn sorted_chunk_orders_by_row_then_col() {
        let partial = product(&[(2, 0, 1.0), (0, 9, 2.0), (0, 1, 3.0), (1, 5, 4.0)]);
        let chunk = partial.into_sorted_chunk();
        assert_eq!(chunk.rows(), &[0, 0, 1, 2]);
        assert_eq!(chunk.cols(), &[1, 9, 5, 0]);
        assert_eq!(chunk.vals(), &[3.0, 2.0, 4.0, 1.0]);
    }

    #[test]
    fn raw_entries_fold_like_join_results() {
        let duplicated: CooChunk = [
            CooEntry::new(1, 1, 1.0),
            CooEntry::new(1, 1, 2.0),
            CooEntry::new(0, 3, 5.0),
        ]
        .into_iter()
        .collect();
        let mut partial = PartialProduct::default();
        partial.accumulate_entries(&duplicated);
        assert_eq!(partial.get(1, 1), Some(3.0));
        assert_eq!(partial.len(), 2);
    }
}
