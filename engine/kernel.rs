// ========================================================================================
//                          The join-multiply-aggregate kernel
// ========================================================================================
//
// One left chunk against one right chunk. The right operand arrives pre-transposed, so
// the product term `A[i,j] * B[j,k]` is a pair of entries with `left.col == right.row`.
// Only matching nonzeros ever meet; an entry without a partner contributes nothing and
// no zero is materialized for it.

use crate::accumulate::PartialProduct;
use crate::types::{CooChunk, Scale};
use ahash::AHashMap;

/// Hash index over a right chunk: join key (`right.row`) to the `(col, val)` entries
/// that carry it, in storage order.
struct RightIndex {
    buckets: AHashMap<i64, Vec<(i64, f64)>>,
}

impl RightIndex {
    fn build(right: &CooChunk) -> Self {
        let mut buckets: AHashMap<i64, Vec<(i64, f64)>> = AHashMap::with_capacity(right.len());
        for entry in right.iter() {
            buckets
                .entry(entry.row)
                .or_default()
                .push((entry.col, entry.val));
        }
        Self { buckets }
    }

    #[inline]
    fn probe(&self, key: i64) -> &[(i64, f64)] {
        match self.buckets.get(&key) {
            Some(entries) => entries,
            None => &[],
        }
    }
}

/// Computes the sparse product contribution of one chunk pair.
///
/// Inner-joins `left.col` against `right.row`, multiplies matched values and sums the
/// products per `(left.row, right.col)`. With a `scale`, every group sum is divided by
/// the scale divisor before it is returned. The result holds each key at most once and
/// is empty when no key matches.
pub fn multiply_chunks(left: &CooChunk, right: &CooChunk, scale: Option<Scale>) -> PartialProduct {
    if left.is_empty() || right.is_empty() {
        return PartialProduct::default();
    }

    let index = RightIndex::build(right);
    let mut product = PartialProduct::with_capacity(left.len().min(right.len()));
    for entry in left.iter() {
        for &(right_col, right_val) in index.probe(entry.col) {
            product.add(entry.row, right_col, entry.val * right_val);
        }
    }

    if let Some(scale) = scale {
        product.divide_by(scale.divisor());
    }
    product
}
