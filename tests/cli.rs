use bigmat::store::CooStore;
use bigmat::types::{CooChunk, CooEntry};
use bigmat::writer::OutputAppender;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::tempdir;

fn write_store(dir: &Path, name: &str, entries: &[(i64, i64, f64)]) -> PathBuf {
    let path = dir.join(name);
    let chunk: CooChunk = entries
        .iter()
        .map(|&(row, col, val)| CooEntry::new(row, col, val))
        .collect();
    let mut appender = OutputAppender::new(&path);
    appender.append(&chunk).expect("write store");
    appender.finish().expect("finish store");
    path
}

#[test]
fn cov_command_writes_scaled_output_and_progress() {
    let tmp = tempdir().expect("temporary directory");
    let a = write_store(tmp.path(), "at.parquet", &[(0, 0, 2.0), (0, 1, 3.0)]);
    let b = write_store(tmp.path(), "a.parquet", &[(0, 0, 5.0), (1, 0, 4.0)]);
    let c = tmp.path().join("cov.parquet");
    let summary = tmp.path().join("cov.run.toml");

    let exe = env!("CARGO_BIN_EXE_bigmat");
    let output = Command::new(exe)
        .args([
            "cov",
            a.to_str().expect("path str"),
            b.to_str().expect("path str"),
            c.to_str().expect("path str"),
            "-n",
            "3",
            "--chunk",
            "2",
            "--chunk-b",
            "1",
            "--summary",
            summary.to_str().expect("path str"),
        ])
        .output()
        .expect("run bigmat");

    assert!(output.status.success(), "bigmat failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Processing A chunk: rows 0 -> 2"));
    assert!(stdout.contains("  Processing B chunk: rows 1 -> 2"));
    assert_eq!(stdout.matches("Done.").count(), 1, "stdout: {stdout}");

    let rows = CooStore::open(&c).unwrap().read_chunk(0, 10).unwrap();
    assert_eq!(rows.rows(), &[0]);
    assert_eq!(rows.vals(), &[11.0]);

    let text = fs::read_to_string(&summary).expect("summary written");
    assert!(text.contains("right_chunk_reads = 2"));
}

#[test]
fn missing_store_exits_non_zero() {
    let tmp = tempdir().expect("temporary directory");
    let a = write_store(tmp.path(), "a.parquet", &[(0, 0, 1.0)]);
    let missing = tmp.path().join("nope.parquet");
    let c = tmp.path().join("c.parquet");

    let exe = env!("CARGO_BIN_EXE_bigmat");
    let output = Command::new(exe)
        .args([
            "multiply",
            a.to_str().unwrap(),
            missing.to_str().unwrap(),
            c.to_str().unwrap(),
        ])
        .output()
        .expect("run bigmat");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
    assert!(!c.exists());
}

#[test]
fn unwritable_output_exits_non_zero() {
    let tmp = tempdir().expect("temporary directory");
    let a = write_store(tmp.path(), "a.parquet", &[(0, 0, 1.0)]);
    let c = tmp.path().join("missing-dir").join("c.parquet");

    let exe = env!("CARGO_BIN_EXE_bigmat");
    let output = Command::new(exe)
        .args([
            "multiply",
            a.to_str().unwrap(),
            a.to_str().unwrap(),
            c.to_str().unwrap(),
        ])
        .output()
        .expect("run bigmat");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("I/O error"), "stderr: {stderr}");
    assert!(!c.exists());
}
