//! Incremental output of per-left-chunk results.
//!
//! The output store is a single Parquet file written through one batched writer. The
//! first append creates the file, truncating anything already at the path; each later
//! append adds one row group with the same three-column schema. The footer is written by
//! [`OutputAppender::finish`], so a run that aborts leaves a store that is not readable.

use crate::store::StoreError;
use crate::types::{COL_COLUMN, CooChunk, ROW_COLUMN, VAL_COLUMN};
use polars::io::parquet::write::BatchedWriter;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Schema shared by every COO store this crate writes.
pub fn coo_schema() -> Schema {
    let mut schema = Schema::with_capacity(3);
    schema.with_column(ROW_COLUMN.into(), DataType::Int64);
    schema.with_column(COL_COLUMN.into(), DataType::Int64);
    schema.with_column(VAL_COLUMN.into(), DataType::Float64);
    schema
}

/// Converts a chunk into a `row`/`col`/`val` frame.
pub fn chunk_to_frame(chunk: &CooChunk) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(ROW_COLUMN.into(), chunk.rows()).into(),
        Series::new(COL_COLUMN.into(), chunk.cols()).into(),
        Series::new(VAL_COLUMN.into(), chunk.vals()).into(),
    ])
}

/// Removes a previous output so a run always starts from an empty store.
pub fn remove_existing_output(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed previous output at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Append-only writer for the output store.
pub struct OutputAppender {
    path: PathBuf,
    writer: Option<BatchedWriter<File>>,
    rows_written: usize,
    row_groups: usize,
}

impl OutputAppender {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: None,
            rows_written: 0,
            row_groups: 0,
        }
    }

    /// Writes `partial` as one row group, creating the store on the first call.
    ///
    /// Empty results are skipped and do not count as the first write.
    pub fn append(&mut self, partial: &CooChunk) -> Result<(), StoreError> {
        if partial.is_empty() {
            return Ok(());
        }
        let frame = chunk_to_frame(partial).map_err(|e| StoreError::polars(&self.path, e))?;
        let path = self.path.clone();
        let writer = self.writer_or_create()?;
        writer
            .write_batch(&frame)
            .map_err(|e| StoreError::write(&path, e))?;
        self.rows_written += partial.len();
        self.row_groups += 1;
        Ok(())
    }

    /// Writes the footer and returns the number of rows in the store.
    ///
    /// A store that never received a row is still created, with the schema and no rows.
    pub fn finish(mut self) -> Result<usize, StoreError> {
        let path = self.path.clone();
        let writer = self.writer_or_create()?;
        writer.finish().map_err(|e| StoreError::write(&path, e))?;
        log::debug!(
            "Closed {} after {} row group(s), {} row(s)",
            path.display(),
            self.row_groups,
            self.rows_written
        );
        Ok(self.rows_written)
    }

    fn writer_or_create(&mut self) -> Result<&mut BatchedWriter<File>, StoreError> {
        if self.writer.is_none() {
            let file = File::create(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
            let writer = ParquetWriter::new(file)
                .batched(&coo_schema())
                .map_err(|e| StoreError::write(&self.path, e))?;
            self.writer = Some(writer);
        }
        self.writer.as_mut().ok_or_else(|| {
            StoreError::io(
                &self.path,
                std::io::Error::other("output writer was not initialised"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CooStore;
    use crate::types::CooEntry;

    fn chunk(entries: &[(i64, i64, f64)]) -> CooChunk {
        entries
            .iter()
            .map(|&(row, col, val)| CooEntry::new(row, col, val))
            .collect()
    }

    #[test]
    fn appends_accumulate_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.parquet");

        let mut appender = OutputAppender::new(&path);
        assert!(!path.exists());
        appender.append(&chunk(&[(0, 0, 1.0), (0, 1, 2.0)])).expect("first");
        assert!(path.exists());
        appender.append(&chunk(&[(0, 0, 3.0)])).expect("second");
        assert_eq!(appender.finish().expect("finish"), 3);

        let store = CooStore::open(&path).expect("open output");
        assert_eq!(store.row_count(), 3);
        let all = store.read_chunk(0, 10).expect("read");
        assert_eq!(all.rows(), &[0, 0, 0]);
        assert_eq!(all.cols(), &[0, 1, 0]);
        assert_eq!(all.vals(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn first_write_overwrites_a_previous_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.parquet");
        fs::write(&path, b"not parquet").expect("seed file");

        let mut appender = OutputAppender::new(&path);
        appender.append(&chunk(&[(4, 2, 0.5)])).expect("append");
        appender.finish().expect("finish");

        assert_eq!(CooStore::open(&path).unwrap().row_count(), 1);
    }

    #[test]
    fn finishing_without_rows_creates_an_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.parquet");

        let mut appender = OutputAppender::new(&path);
        appender.append(&CooChunk::default()).expect("empty append");
        assert!(!path.exists());
        assert_eq!(appender.finish().expect("finish"), 0);

        let store = CooStore::open(&path).expect("open empty output");
        assert_eq!(store.row_count(), 0);
        assert!(store.read_chunk(0, 5).unwrap().is_empty());
    }

    #[test]
    fn output_in_a_missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("no-such-dir").join("out.parquet");

        let mut appender = OutputAppender::new(&path);
        match appender.append(&chunk(&[(0, 0, 1.0)])) {
            Err(StoreError::Io { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn removing_a_missing_output_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        remove_existing_output(&dir.path().join("never-written.parquet")).expect("noop");
    }
}
