//! Opt-in global merge of duplicate output keys.
//!
//! A chunked run keeps one output row per `(row, col)` per left chunk. This pass reads
//! the finished output back in chunks, sums every key across the whole store and
//! rewrites it sorted by `(row, col)`. All distinct keys are held in memory at once.

use crate::accumulate::PartialProduct;
use crate::store::{CooStore, StoreError};
use crate::types::CooChunk;
use crate::writer::OutputAppender;
use std::fs;
use std::path::Path;

/// Rewrites the store at `path` with one row per distinct key and returns the new row
/// count. `chunk` bounds how many entries are read per request.
pub fn merge_duplicate_keys(path: &Path, chunk: usize) -> Result<usize, StoreError> {
    let store = CooStore::open(path)?;
    let total = store.row_count();
    let chunk = chunk.max(1);

    let mut merged = PartialProduct::default();
    let mut offset = 0;
    while offset < total {
        let entries = store.read_chunk(offset, chunk)?;
        if entries.is_empty() {
            break;
        }
        merged.accumulate_entries(&entries);
        offset = offset.saturating_add(chunk);
    }
    log::info!(
        "Consolidating {}: {} rows into {} distinct keys",
        path.display(),
        total,
        merged.len()
    );

    let staging = path.with_extension("consolidating.parquet");
    replace_via_staging(&merged.into_sorted_chunk(), &staging, path)
}

/// Writes `entries` to `staging` and renames it over `target`. The staging file does
/// not survive a failure.
fn replace_via_staging(
    entries: &CooChunk,
    staging: &Path,
    target: &Path,
) -> Result<usize, StoreError> {
    let written = (|| -> Result<usize, StoreError> {
        let mut appender = OutputAppender::new(staging);
        appender.append(entries)?;
        let rows = appender.finish()?;
        fs::rename(staging, target).map_err(|e| StoreError::io(target, e))?;
        Ok(rows)
    })();
    if written.is_err() && staging.exists() {
        if let Err(e) = fs::remove_file(staging) {
            log::warn!("Could not remove {}: {e}", staging.display());
        }
    }
    written
}
