//! # COO Store Access
//!
//! Read-side access to a COO matrix persisted as a Parquet file with exactly the
//! columns `row`, `col` and `val`.
//!
//! - Metadata first: the entry count comes from the Parquet footer, and the schema
//!   check reads at most one entry. Bulk data is only read when a chunk is requested.
//! - Stateless chunks: every chunk request opens the file and reads one projected
//!   slice. There is no live cursor, so a chunk can be re-read at any offset, in any
//!   order.
//! - Normalised types: whatever the storage width, `row`/`col` come back as `i64`
//!   and `val` as `f64` so join keys are always comparable.

use crate::types::{COL_COLUMN, CooChunk, ROW_COLUMN, VAL_COLUMN};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures while probing, reading or writing a COO store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store '{}' does not exist.", path.display())]
    StoreNotFound { path: PathBuf },

    #[error("Store '{}' does not have the expected row/col/val schema: {reason}", path.display())]
    Schema { path: PathBuf, reason: String },

    #[error("I/O error on store '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error from the underlying Polars library on store '{}': {source}", path.display())]
    Polars {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn polars(path: &Path, source: PolarsError) -> Self {
        Self::Polars {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Failures while writing an output store are reported as I/O errors, whatever
    /// layer raised them.
    pub(crate) fn write(path: &Path, source: PolarsError) -> Self {
        Self::io(path, std::io::Error::other(source))
    }

    fn schema(path: &Path, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Returns the number of COO entries in the store at `path`, read from the footer.
pub fn row_count(path: &Path) -> Result<usize, StoreError> {
    Ok(CooStore::open(path)?.row_count())
}

/// A validated handle on a stored COO matrix.
#[derive(Debug, Clone)]
pub struct CooStore {
    path: PathBuf,
    entries: usize,
}

impl CooStore {
    /// Checks that the store exists and carries the three canonical numeric columns,
    /// and reads its entry count from the footer.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::StoreNotFound {
                path: path.to_path_buf(),
            });
        }
        let mut store = Self {
            path: path.to_path_buf(),
            entries: 0,
        };
        store.check_schema()?;
        store.entries = ParquetReader::new(store.open_file()?)
            .num_rows()
            .map_err(|e| StoreError::polars(path, e))?;
        Ok(store)
    }

    /// Total number of entries, as recorded in the Parquet footer.
    pub fn row_count(&self) -> usize {
        self.entries
    }

    /// Reads up to `length` entries starting at flat position `offset`.
    ///
    /// Past the end of the store the result is short, and empty once `offset` reaches
    /// the entry count. An empty chunk is the end-of-data signal, not an error.
    pub fn read_chunk(&self, offset: usize, length: usize) -> Result<CooChunk, StoreError> {
        if length == 0 || offset >= self.entries {
            return Ok(CooChunk::default());
        }
        let length = length.min(self.entries - offset);
        let df = self.read_slice(offset, length)?;

        let row = self.extract_i64(&df, ROW_COLUMN)?;
        let col = self.extract_i64(&df, COL_COLUMN)?;
        let val = self.extract_f64(&df, VAL_COLUMN)?;
        CooChunk::from_columns(row, col, val)
            .map_err(|reason| StoreError::schema(&self.path, reason))
    }

    fn open_file(&self) -> Result<File, StoreError> {
        File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::StoreNotFound {
                    path: self.path.clone(),
                }
            } else {
                StoreError::io(&self.path, e)
            }
        })
    }

    /// A fresh projected read of `length` entries at `offset`; no reader outlives it.
    fn read_slice(&self, offset: usize, length: usize) -> Result<DataFrame, StoreError> {
        ParquetReader::new(self.open_file()?)
            .with_columns(Some(canonical_columns()))
            .with_slice(Some((offset, length)))
            .finish()
            .map_err(|e| StoreError::polars(&self.path, e))
    }

    fn check_schema(&self) -> Result<(), StoreError> {
        let head = ParquetReader::new(self.open_file()?)
            .with_slice(Some((0, 1)))
            .finish()
            .map_err(|e| StoreError::schema(&self.path, e.to_string()))?;

        for name in [ROW_COLUMN, COL_COLUMN] {
            let dtype = self.column_dtype(&head, name)?;
            if !dtype.is_integer() {
                return Err(StoreError::schema(
                    &self.path,
                    format!("column '{name}' must be an integer, found {dtype}"),
                ));
            }
        }
        let dtype = self.column_dtype(&head, VAL_COLUMN)?;
        if !(dtype.is_float() || dtype.is_integer()) {
            return Err(StoreError::schema(
                &self.path,
                format!("column '{VAL_COLUMN}' must be numeric, found {dtype}"),
            ));
        }
        Ok(())
    }

    fn column_dtype(&self, df: &DataFrame, name: &str) -> Result<DataType, StoreError> {
        df.column(name)
            .map(|column| column.dtype().clone())
            .map_err(|_| {
                StoreError::schema(&self.path, format!("required column '{name}' is missing"))
            })
    }

    fn non_null_column(
        &self,
        df: &DataFrame,
        name: &str,
        dtype: &DataType,
    ) -> Result<Column, StoreError> {
        let column = df
            .column(name)
            .map_err(|e| StoreError::schema(&self.path, e.to_string()))?;
        if column.null_count() > 0 {
            return Err(StoreError::schema(
                &self.path,
                format!("column '{name}' contains null entries"),
            ));
        }
        column.strict_cast(dtype).map_err(|_| {
            StoreError::schema(
                &self.path,
                format!("column '{name}' has values that do not fit in {dtype}"),
            )
        })
    }

    fn extract_i64(&self, df: &DataFrame, name: &str) -> Result<Vec<i64>, StoreError> {
        let column = self.non_null_column(df, name, &DataType::Int64)?;
        let values = column
            .i64()
            .map_err(|e| StoreError::schema(&self.path, e.to_string()))?;
        Ok(values.into_no_null_iter().collect())
    }

    fn extract_f64(&self, df: &DataFrame, name: &str) -> Result<Vec<f64>, StoreError> {
        let column = self.non_null_column(df, name, &DataType::Float64)?;
        let values = column
            .f64()
            .map_err(|e| StoreError::schema(&self.path, e.to_string()))?;
        Ok(values.into_no_null_iter().collect())
    }
}

fn canonical_columns() -> Vec<String> {
    vec![
        ROW_COLUMN.to_string(),
        COL_COLUMN.to_string(),
        VAL_COLUMN.to_string(),
    ]
}
