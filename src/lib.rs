// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod harness;
pub mod logging;
pub mod pedantic;
pub mod race;
pub mod report;
pub mod tester;
pub mod types;

use tracing::debug;

use crate::cli::CliArgs;
use crate::errors::Result;
use crate::fs::RealFileSystem;
use crate::harness::{replay, results_path, Harness};
use crate::report::ConsoleSink;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - spec loading and validation
/// - scheduler / runtime / executor
/// - Ctrl-C handling and the run budget
/// - the race check, report and results file
///
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    if args.show_last_run {
        let path = results_path(&args);
        debug!(path = %path.display(), "replaying previous run");
        let report = replay(&RealFileSystem, &path)?;
        for record in &report.records {
            if args.verbose || !report::is_filtered(record) {
                println!("{}", report::format_result_line(record));
            }
        }
        print!("{}", report.render(args.verbose));
        return Ok(report.exit_code);
    }

    let harness = Harness::from_args(&args)?;

    if args.dry_run {
        print!("{}", harness.dry_run()?);
        debug!("dry-run complete (no execution)");
        return Ok(0);
    }

    let report = harness
        .run(Box::new(ConsoleSink::stdout(args.verbose)))
        .await?;
    print!("{}", report.render(args.verbose));
    Ok(report.exit_code)
}
