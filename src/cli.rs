// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::RaceCheckMode;

/// Command-line arguments for `testharness`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "testharness",
    version,
    about = "Run a dependency-ordered suite of test commands in parallel.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the root test specification file (TOML).
    #[arg(long, value_name = "PATH", default_value = "tests.toml")]
    pub spec: PathBuf,

    /// Number of processor slots to schedule onto.
    ///
    /// Overrides `[harness].slots`; defaults to the number of CPUs.
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Stop dispatching new tests after this many failures.
    #[arg(long, value_name = "N")]
    pub max_fails: Option<usize>,

    /// Global wall-clock budget for the whole run, in seconds.
    #[arg(long, value_name = "SECS")]
    pub run_budget: Option<u64>,

    /// How to treat race conditions between unordered tests.
    #[arg(long, value_enum, value_name = "MODE")]
    pub race_check: Option<RaceCheckMode>,

    /// Hash each working directory before and after a test to detect the
    /// files it actually modified.
    #[arg(long)]
    pub pedantic_checks: bool,

    /// Only run tests whose name matches this regular expression.
    #[arg(long = "re", value_name = "REGEX")]
    pub name_filter: Option<String>,

    /// Only run tests that belong to this group label.
    #[arg(long, value_name = "NAME")]
    pub group: Option<String>,

    /// Where to write the machine-readable results.
    #[arg(long, value_name = "PATH")]
    pub results_file: Option<PathBuf>,

    /// Re-render the report of the previous run from the results file
    /// without executing anything.
    #[arg(long)]
    pub show_last_run: bool,

    /// Re-run only the tests that failed in the previous run, plus the
    /// prerequisites they need.
    #[arg(long)]
    pub failed_tests: bool,

    /// Parse + validate, print the job graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print every result, including filtered tests, and the longest jobs.
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESTHARNESS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
