use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;

/// Observer for reporting progress of a chunked multiplication run.
///
/// Offsets and lengths are flat entry positions in the respective store.
pub trait MultiplyProgressObserver {
    fn on_run_start(&mut self, left_entries: usize, right_entries: usize, left_chunks: usize) {
        let _ = (left_entries, right_entries, left_chunks);
    }
    fn on_left_chunk(&mut self, offset: usize, end: usize) {
        let _ = (offset, end);
    }
    fn on_right_chunk(&mut self, offset: usize, end: usize) {
        let _ = (offset, end);
    }
    fn on_left_chunk_written(&mut self, rows: usize) {
        let _ = rows;
    }
    fn on_run_finish(&mut self, rows_written: usize) {
        let _ = rows_written;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl MultiplyProgressObserver for NoopProgress {}

/// Prints one line per left chunk and per right chunk to standard output.
///
/// When stdout is a terminal the lines are printed above a bar counting left chunks.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let draw_target = if std::io::stdout().is_terminal() {
            ProgressDrawTarget::stdout_with_hz(10)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, draw_target);
        let style = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} left chunks ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        Self { bar }
    }

    fn emit(&self, line: String) {
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiplyProgressObserver for ConsoleProgress {
    fn on_run_start(&mut self, left_entries: usize, right_entries: usize, left_chunks: usize) {
        self.emit(format!(
            "A: {left_entries} nonzero entries, B: {right_entries} nonzero entries"
        ));
        self.bar.set_length(left_chunks as u64);
    }

    fn on_left_chunk(&mut self, offset: usize, end: usize) {
        self.emit(format!("Processing A chunk: rows {offset} -> {end}"));
    }

    fn on_right_chunk(&mut self, offset: usize, end: usize) {
        self.emit(format!("  Processing B chunk: rows {offset} -> {end}"));
    }

    fn on_left_chunk_written(&mut self, rows: usize) {
        self.bar.set_message(format!("{rows} rows in last chunk"));
        self.bar.inc(1);
    }

    fn on_run_finish(&mut self, rows_written: usize) {
        self.emit(format!("Done. Wrote {rows_written} rows."));
        self.bar.finish_and_clear();
    }
}
