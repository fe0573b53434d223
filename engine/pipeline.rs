// ========================================================================================
//
//                         The chunked multiply orchestrator
//
// ========================================================================================
//
// Drives `C = A x B` (or `A x B / (n - 1)` in covariance mode) over two COO stores that
// need not fit in memory. The left operand is swept once in chunks; for every left
// chunk the right operand is swept in full, chunk by chunk, and each chunk pair goes
// through the join-multiply-aggregate kernel. The kernel outputs of one left chunk are
// folded into one partial result, which is appended to the output store before the
// next left chunk is read. Memory is bounded by one left chunk, one right chunk and one
// partial result (times the worker count in parallel mode).
//
// Output keys are unique within one left chunk's contribution only. Chunks are flat
// offsets into an unsorted entry list, so two left chunks can emit the same `(row, col)`
// and both rows are kept. The opt-in consolidation pass is the only place they merge.

use crate::accumulate::PartialProduct;
use crate::consolidate;
use crate::kernel::multiply_chunks;
use crate::progress::MultiplyProgressObserver;
use crate::store::{CooStore, StoreError};
use crate::types::{CooChunk, Scale};
use crate::writer::{OutputAppender, remove_existing_output};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;

/// Entries per left-operand chunk when none is given.
pub const DEFAULT_LEFT_CHUNK: usize = 5_000_000;
/// Entries per right-operand chunk when none is given.
pub const DEFAULT_RIGHT_CHUNK: usize = 1_000_000;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("The {which} chunk size must be at least 1.")]
    ZeroChunkSize { which: &'static str },

    #[error("Covariance scaling needs at least 2 total rows, got {total_rows}.")]
    InvalidScale { total_rows: u64 },

    #[error("Output '{}' is also an input store; refusing to overwrite it.", path.display())]
    SameStore { path: PathBuf },

    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Run cancelled after {left_chunks_written} left chunk(s) were written.")]
    Cancelled { left_chunks_written: usize },

    #[error("Failed to serialize the run summary: {0}")]
    Summary(#[from] toml::ser::Error),

    #[error("Failed to write the run summary to '{}': {source}", path.display())]
    SummaryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Builds the covariance scale for `total_rows` observations.
pub fn covariance_scale(total_rows: u64) -> Result<Scale, PipelineError> {
    Scale::covariance(total_rows).ok_or(PipelineError::InvalidScale { total_rows })
}

/// Tuning and mode settings of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub left_chunk: usize,
    pub right_chunk: usize,
    /// `Some` in covariance mode.
    pub scale: Option<Scale>,
    /// Left chunks processed at once. 1 is the plain sequential sweep.
    pub threads: usize,
    /// Sum duplicate keys across left chunks after the run. Loads the whole output.
    pub consolidate: bool,
    /// Checked between left chunks; setting it stops the run at the next boundary.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            left_chunk: DEFAULT_LEFT_CHUNK,
            right_chunk: DEFAULT_RIGHT_CHUNK,
            scale: None,
            threads: 1,
            consolidate: false,
            cancel: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.left_chunk == 0 {
            return Err(PipelineError::ZeroChunkSize { which: "left" });
        }
        if self.right_chunk == 0 {
            return Err(PipelineError::ZeroChunkSize { which: "right" });
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// What a finished run did, suitable for writing next to the output.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub left_store: String,
    pub right_store: String,
    pub output_store: String,
    pub left_entries: usize,
    pub right_entries: usize,
    pub left_chunk_size: usize,
    pub right_chunk_size: usize,
    pub scale_divisor: Option<f64>,
    pub threads: usize,
    pub left_chunks: usize,
    pub right_chunk_reads: usize,
    pub rows_written: usize,
    pub consolidated: bool,
}

impl RunSummary {
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| PipelineError::SummaryIo {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A left chunk after its full right sweep, ready to append.
struct SweptChunk {
    offset: usize,
    end: usize,
    entries: CooChunk,
    right_spans: Vec<(usize, usize)>,
}

/// Counters kept while left chunks are appended.
#[derive(Default)]
struct Tally {
    left_chunks: usize,
    right_chunk_reads: usize,
}

/// Multiplies the COO store at `left` by the pre-transposed COO store at `right` and
/// writes the product to `output`, replacing whatever was there.
pub fn run(
    left: &Path,
    right: &Path,
    output: &Path,
    config: &RunConfig,
    progress: &mut dyn MultiplyProgressObserver,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let started = Instant::now();

    let left_store = CooStore::open(left)?;
    let right_store = CooStore::open(right)?;
    reject_output_aliasing(output, &[left, right])?;

    let left_total = left_store.row_count();
    let right_total = right_store.row_count();
    let left_chunks = left_total.div_ceil(config.left_chunk);
    log::info!(
        "Multiplying {} ({} entries) by {} ({} entries) into {}",
        left.display(),
        left_total,
        right.display(),
        right_total,
        output.display()
    );
    if let Some(scale) = config.scale {
        log::info!("Covariance mode: scaling every sum by {scale}");
    }
    progress.on_run_start(left_total, right_total, left_chunks);

    remove_existing_output(output)?;
    let mut appender = OutputAppender::new(output);
    let sweep = Sweep {
        left: &left_store,
        right: &right_store,
        left_total,
        right_total,
        config,
    };

    let outcome = if config.threads > 1 {
        sweep.run_parallel(&mut appender, progress)
    } else {
        sweep.run_sequential(&mut appender, progress)
    };
    let tally = match outcome {
        Ok(tally) => tally,
        Err(PipelineError::Cancelled {
            left_chunks_written,
        }) => {
            appender.finish()?;
            log::warn!("Run cancelled; output holds {left_chunks_written} left chunk(s)");
            return Err(PipelineError::Cancelled {
                left_chunks_written,
            });
        }
        Err(e) => return Err(e),
    };

    let mut rows_written = appender.finish()?;
    if config.consolidate {
        rows_written = consolidate::merge_duplicate_keys(output, config.left_chunk)?;
    }
    progress.on_run_finish(rows_written);
    log::info!(
        "Wrote {} rows to {} in {:.2?}",
        rows_written,
        output.display(),
        started.elapsed()
    );

    Ok(RunSummary {
        left_store: left.display().to_string(),
        right_store: right.display().to_string(),
        output_store: output.display().to_string(),
        left_entries: left_total,
        right_entries: right_total,
        left_chunk_size: config.left_chunk,
        right_chunk_size: config.right_chunk,
        scale_divisor: config.scale.map(Scale::divisor),
        threads: config.threads.max(1),
        left_chunks: tally.left_chunks,
        right_chunk_reads: tally.right_chunk_reads,
        rows_written,
        consolidated: config.consolidate,
    })
}

fn reject_output_aliasing(output: &Path, inputs: &[&Path]) -> Result<(), PipelineError> {
    let Ok(output_canonical) = output.canonicalize() else {
        return Ok(());
    };
    for input in inputs {
        if input.canonicalize().is_ok_and(|p| p == output_canonical) {
            return Err(PipelineError::SameStore {
                path: output.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Folds the products of one left chunk against every right chunk into one partial
/// result. `on_right` sees each right chunk as it is read.
fn sweep_right(
    left: &CooChunk,
    right_store: &CooStore,
    right_total: usize,
    config: &RunConfig,
    on_right: &mut dyn FnMut(usize, usize),
) -> Result<PartialProduct, StoreError> {
    let mut partial = PartialProduct::default();
    let mut offset = 0;
    while offset < right_total {
        let right = right_store.read_chunk(offset, config.right_chunk)?;
        if right.is_empty() {
            break;
        }
        on_right(offset, offset + right.len());
        let joined = multiply_chunks(left, &right, config.scale);
        log::debug!(
            "Right chunk at {offset}: {} joined key(s), {} key(s) held",
            joined.len(),
            partial.len()
        );
        partial.accumulate(joined);
        offset = offset.saturating_add(config.right_chunk);
    }
    Ok(partial)
}

struct Sweep<'a> {
    left: &'a CooStore,
    right: &'a CooStore,
    left_total: usize,
    right_total: usize,
    config: &'a RunConfig,
}

impl Sweep<'_> {
    fn run_sequential(
        &self,
        appender: &mut OutputAppender,
        progress: &mut dyn MultiplyProgressObserver,
    ) -> Result<Tally, PipelineError> {
        let mut tally = Tally::default();
        let mut offset = 0;
        while offset < self.left_total {
            if self.config.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    left_chunks_written: tally.left_chunks,
                });
            }
            let left = self.left.read_chunk(offset, self.config.left_chunk)?;
            if left.is_empty() {
                break;
            }
            progress.on_left_chunk(offset, offset + left.len());

            let mut right_reads = 0;
            let partial = sweep_right(
                &left,
                self.right,
                self.right_total,
                self.config,
                &mut |start, end| {
                    right_reads += 1;
                    progress.on_right_chunk(start, end);
                },
            )?;
            drop(left);

            let entries = partial.into_sorted_chunk();
            appender.append(&entries)?;
            progress.on_left_chunk_written(entries.len());
            tally.left_chunks += 1;
            tally.right_chunk_reads += right_reads;
            offset = offset.saturating_add(self.config.left_chunk);
        }
        Ok(tally)
    }

    /// Sweeps `threads` left chunks at a time and appends them in offset order, so the
    /// output is identical to the sequential sweep.
    fn run_parallel(
        &self,
        appender: &mut OutputAppender,
        progress: &mut dyn MultiplyProgressObserver,
    ) -> Result<Tally, PipelineError> {
        let threads = self.config.threads;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;
        let wave_span = self.config.left_chunk.saturating_mul(threads);

        let mut tally = Tally::default();
        let mut wave_start = 0;
        while wave_start < self.left_total {
            if self.config.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    left_chunks_written: tally.left_chunks,
                });
            }
            let offsets: Vec<usize> = (0..threads)
                .map(|i| wave_start.saturating_add(i.saturating_mul(self.config.left_chunk)))
                .take_while(|&offset| offset < self.left_total)
                .collect();
            let wave: Vec<Option<SweptChunk>> = pool.install(|| {
                offsets
                    .par_iter()
                    .map(|&offset| self.sweep_left_at(offset))
                    .collect::<Result<Vec<_>, StoreError>>()
            })?;

            for swept in wave {
                let Some(swept) = swept else {
                    return Ok(tally);
                };
                progress.on_left_chunk(swept.offset, swept.end);
                for &(start, end) in &swept.right_spans {
                    progress.on_right_chunk(start, end);
                }
                appender.append(&swept.entries)?;
                progress.on_left_chunk_written(swept.entries.len());
                tally.left_chunks += 1;
                tally.right_chunk_reads += swept.right_spans.len();
            }
            wave_start = wave_start.saturating_add(wave_span);
        }
        Ok(tally)
    }

    fn sweep_left_at(&self, offset: usize) -> Result<Option<SweptChunk>, StoreError> {
        let left = self.left.read_chunk(offset, self.config.left_chunk)?;
        if left.is_empty() {
            return Ok(None);
        }
        let mut right_spans = Vec::new();
        let partial = sweep_right(
            &left,
            self.right,
            self.right_total,
            self.config,
            &mut |start, end| right_spans.push((start, end)),
        )?;
        Ok(Some(SweptChunk {
            offset,
            end: offset + left.len(),
            entries: partial.into_sorted_chunk(),
            right_spans,
        }))
    }
}
