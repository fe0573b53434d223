// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use std::fmt;

/// Canonical column names of every COO store, input or output.
pub const ROW_COLUMN: &str = "row";
pub const COL_COLUMN: &str = "col";
pub const VAL_COLUMN: &str = "val";

/// One nonzero matrix element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooEntry {
    pub row: i64,
    pub col: i64,
    pub val: f64,
}

impl CooEntry {
    #[inline]
    pub fn new(row: i64, col: i64, val: f64) -> Self {
        Self { row, col, val }
    }
}

/// A bounded slice of a stored matrix's flat entry sequence, held column-wise.
///
/// Entries keep storage order. Nothing about a chunk is row-aligned: the nonzeros of
/// one logical row may be spread over several chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooChunk {
    row: Vec<i64>,
    col: Vec<i64>,
    val: Vec<f64>,
}

impl CooChunk {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            row: Vec::with_capacity(capacity),
            col: Vec::with_capacity(capacity),
            val: Vec::with_capacity(capacity),
        }
    }

    /// Builds a chunk from three equally long columns.
    pub fn from_columns(row: Vec<i64>, col: Vec<i64>, val: Vec<f64>) -> Result<Self, String> {
        if row.len() != val.len() || col.len() != val.len() {
            return Err(format!(
                "COO columns must have equal length (row={}, col={}, val={})",
                row.len(),
                col.len(),
                val.len()
            ));
        }
        Ok(Self { row, col, val })
    }

    #[inline]
    pub fn push(&mut self, entry: CooEntry) {
        self.row.push(entry.row);
        self.col.push(entry.col);
        self.val.push(entry.val);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.val.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }

    pub fn rows(&self) -> &[i64] {
        &self.row
    }

    pub fn cols(&self) -> &[i64] {
        &self.col
    }

    pub fn vals(&self) -> &[f64] {
        &self.val
    }

    pub fn iter(&self) -> impl Iterator<Item = CooEntry> + '_ {
        self.row
            .iter()
            .zip(&self.col)
            .zip(&self.val)
            .map(|((&row, &col), &val)| CooEntry { row, col, val })
    }
}

impl FromIterator<CooEntry> for CooChunk {
    fn from_iter<I: IntoIterator<Item = CooEntry>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut chunk = CooChunk::with_capacity(iter.size_hint().0);
        for entry in iter {
            chunk.push(entry);
        }
        chunk
    }
}

/// Divisor that turns a raw cross-product sum into a covariance-style statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale(f64);

impl Scale {
    /// The covariance denominator for `total_rows` observations, `total_rows - 1`.
    /// Returns `None` when that denominator would not be positive.
    pub fn covariance(total_rows: u64) -> Option<Self> {
        if total_rows < 2 {
            return None;
        }
        Some(Self((total_rows - 1) as f64))
    }

    #[inline]
    pub fn divisor(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1/{}", self.0)
    }
}
