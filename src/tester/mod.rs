// src/tester/mod.rs

//! Result validation for jobs.
//!
//! A job's terminal status is decided in two stages:
//!
//! 1. the runner's [`Outcome`] (spawn failure, timeout, cancellation, exit
//!    code or signal), then
//! 2. the job's [`Tester`], which may fail a zero exit code (output or file
//!    expectations not met) or pass a crash (`should_crash`).
//!
//! Tester kinds are picked once when the spec is parsed ([`TesterKind`]).
//!
//! - [`run_command`] checks the exit code only.
//! - [`run_app`] adds expectations on the captured output.
//! - [`check_files`] adds existence checks on files the test should write.

pub mod check_files;
pub mod run_app;
pub mod run_command;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::TestConfig;
use crate::dag::JobStatus;
use crate::exec::{ExitKind, Outcome};
use crate::fs::FileSystem;
use crate::types::TesterType;

pub use check_files::CheckFiles;
pub use run_app::RunApp;
pub use run_command::RunCommand;

/// What the tester sees after the process exited on its own.
#[derive(Debug, Clone, Copy)]
pub struct ResultContext<'a> {
    pub fs: &'a dyn FileSystem,
    pub working_dir: &'a Path,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
    /// Combined stdout followed by stderr.
    pub output: &'a str,
}

/// Terminal status plus the annotated output to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: JobStatus,
    pub reason: Option<String>,
    pub output: String,
}

impl Verdict {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Passed,
            reason: None,
            output: output.into(),
        }
    }

    pub fn with_status(status: JobStatus, reason: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            output: output.into(),
        }
    }
}

/// The polymorphic strategy behind a job.
pub trait Tester {
    /// Called right before the process is spawned. `modified_files` are
    /// already resolved against the job's working directory.
    fn prepare(&self, fs: &dyn FileSystem, modified_files: &[PathBuf]) -> Result<()>;

    /// Argument vector to execute.
    fn build_command(&self) -> Vec<String>;

    /// Turn a finished process into a terminal status.
    fn process_result(&self, ctx: &ResultContext<'_>) -> Verdict;
}

/// Tester variants selectable from the spec file's `type` field.
#[derive(Debug, Clone)]
pub enum TesterKind {
    RunCommand(RunCommand),
    RunApp(RunApp),
    CheckFiles(CheckFiles),
}

impl TesterKind {
    pub fn from_config(cfg: &TestConfig) -> Self {
        let base = RunCommand::from_config(cfg);
        match cfg.tester {
            TesterType::RunCommand => TesterKind::RunCommand(base),
            TesterType::RunApp => TesterKind::RunApp(RunApp::from_config(base, cfg)),
            TesterType::CheckFiles => {
                TesterKind::CheckFiles(CheckFiles::from_config(base, cfg))
            }
        }
    }

    fn inner(&self) -> &dyn Tester {
        match self {
            TesterKind::RunCommand(t) => t,
            TesterKind::RunApp(t) => t,
            TesterKind::CheckFiles(t) => t,
        }
    }
}

impl Tester for TesterKind {
    fn prepare(&self, fs: &dyn FileSystem, modified_files: &[PathBuf]) -> Result<()> {
        self.inner().prepare(fs, modified_files)
    }

    fn build_command(&self) -> Vec<String> {
        self.inner().build_command()
    }

    fn process_result(&self, ctx: &ResultContext<'_>) -> Verdict {
        self.inner().process_result(ctx)
    }
}

/// Combine the runner outcome with the tester's own checks.
pub fn evaluate(
    tester: &dyn Tester,
    outcome: &Outcome,
    fs: &dyn FileSystem,
    working_dir: &Path,
) -> Verdict {
    let output = outcome.combined_output();

    match &outcome.kind {
        ExitKind::SpawnFailed(err) => Verdict::with_status(
            JobStatus::Failed,
            "SPAWN FAILED",
            format!("{output}{err}\n"),
        ),
        ExitKind::TimedOut => Verdict::with_status(JobStatus::Timeout, "TIMEOUT", output),
        ExitKind::Cancelled => Verdict::with_status(JobStatus::Cancelled, "KILLED", output),
        ExitKind::Exited(code) => tester.process_result(&ResultContext {
            fs,
            working_dir,
            exit_code: Some(*code),
            signal: None,
            output: &output,
        }),
        ExitKind::Signaled(signal) => tester.process_result(&ResultContext {
            fs,
            working_dir,
            exit_code: None,
            signal: Some(*signal),
            output: &output,
        }),
    }
}

/// Append a section header the way failure annotations are rendered.
pub(crate) fn output_header(output: &mut String, title: &str, body: &str) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push('\n');
    output.push_str(title);
    output.push_str("\n\n");
    output.push_str(body);
    output.push('\n');
}
