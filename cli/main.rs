// ========================================================================================
//
//                         The command-line front end: bigmat
//
// ========================================================================================
//
// Parses arguments, sets up logging and hands one run to the library orchestrator.
// Every fatal error ends the process with status 1 after printing the failing store or
// operation.

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use bigmat::pipeline::{
    self, DEFAULT_LEFT_CHUNK, DEFAULT_RIGHT_CHUNK, PipelineError, RunConfig, covariance_scale,
};
use bigmat::progress::ConsoleProgress;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "bigmat",
    version,
    about = "Out-of-core multiplication of sparse COO matrices stored as Parquet."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute C = A x B
    #[command(about = "Multiply two COO Parquet matrices")]
    Multiply(ChunkedArgs),

    /// Compute C = A x B / (n - 1)
    #[command(about = "Multiply and scale into a covariance matrix")]
    Cov(CovArgs),
}

#[derive(Args)]
struct ChunkedArgs {
    /// COO Parquet store of the left operand A
    #[arg(value_name = "A")]
    left: PathBuf,

    /// COO Parquet store of the right operand B, already transposed
    #[arg(value_name = "B")]
    right: PathBuf,

    /// Output COO Parquet store C (replaced if it exists)
    #[arg(value_name = "C")]
    output: PathBuf,

    /// Entries per chunk of A
    #[arg(long, default_value_t = DEFAULT_LEFT_CHUNK)]
    chunk: usize,

    /// Entries per chunk of B
    #[arg(long = "chunk-b", alias = "chunk_B", default_value_t = DEFAULT_RIGHT_CHUNK)]
    chunk_b: usize,

    /// Number of A chunks processed at once
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Sum duplicate (row, col) keys across A chunks after the run
    #[arg(long)]
    consolidate: bool,

    /// Write a TOML summary of the run to this path
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,
}

#[derive(Args)]
struct CovArgs {
    #[command(flatten)]
    chunked: ChunkedArgs,

    /// Total number of rows (observations); sums are divided by n - 1
    #[arg(short = 'n', long = "total-rows")]
    total_rows: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Multiply(args) => run_chunked(args, None),
        Commands::Cov(args) => covariance_scale(args.total_rows)
            .and_then(|scale| run_chunked(args.chunked, Some(scale))),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_chunked(
    args: ChunkedArgs,
    scale: Option<bigmat::types::Scale>,
) -> Result<(), PipelineError> {
    let config = RunConfig {
        left_chunk: args.chunk,
        right_chunk: args.chunk_b,
        scale,
        threads: args.threads,
        consolidate: args.consolidate,
        cancel: None,
    };

    let mut progress = ConsoleProgress::new();
    let summary = pipeline::run(
        &args.left,
        &args.right,
        &args.output,
        &config,
        &mut progress,
    )?;

    if let Some(path) = &args.summary {
        summary.save(path)?;
        println!("Run summary saved to: {}", path.display());
    }
    println!("Output saved to: {}", args.output.display());
    Ok(())
}
