// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{RaceCheckMode, TesterType};

/// Prerequisite placeholder meaning "every other test in the same file".
pub const PREREQ_ALL: &str = "ALL";

/// Substrings that fail a `run_app` test even when it exits 0.
pub const DEFAULT_ERROR_MESSAGES: &[&str] = &[
    "ERROR",
    "command not found",
    "terminate called after throwing an instance of",
];

/// Spec file as read from TOML, before validation.
///
/// ```toml
/// [harness]
/// slots = 4
/// race_check = "error"
///
/// [test.mesh]
/// command = ["./app", "-i", "mesh.i"]
/// modified_files = ["mesh_out.e"]
///
/// [test.solve]
/// cmd = "./app -i solve.i"
/// prereq = ["mesh"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSpecFile {
    /// Global harness behaviour from `[harness]`.
    #[serde(default)]
    pub harness: HarnessSection,

    /// All tests from `[test.<name>]`, keyed by test name.
    #[serde(default)]
    pub test: BTreeMap<String, TestConfig>,
}

/// A spec file that passed [`crate::config::validate_spec`].
///
/// Only constructible through `TryFrom<RawSpecFile>`.
#[derive(Debug, Clone)]
pub struct SpecFile {
    pub harness: HarnessSection,
    pub test: BTreeMap<String, TestConfig>,
}

impl SpecFile {
    pub(crate) fn new_unchecked(
        harness: HarnessSection,
        test: BTreeMap<String, TestConfig>,
    ) -> Self {
        Self { harness, test }
    }
}

/// `[harness]` section.
///
/// Only the root spec file's section is honoured; included files contribute
/// tests only.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessSection {
    /// Processor slots to schedule onto. `None` means "number of CPUs".
    #[serde(default)]
    pub slots: Option<usize>,

    /// Timeout in seconds for tests that do not set their own.
    #[serde(default = "default_timeout")]
    pub default_timeout: u64,

    /// Grace period between SIGTERM and SIGKILL when killing a test.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Per-stream capture limit; longer output keeps its head and tail.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default)]
    pub race_check: RaceCheckMode,

    /// Hash working directories to detect modified files.
    #[serde(default)]
    pub pedantic_checks: bool,

    /// Stop dispatching after this many failed tests.
    #[serde(default)]
    pub max_failures: Option<usize>,

    /// Global wall-clock budget in seconds.
    #[serde(default)]
    pub run_budget: Option<u64>,

    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,

    /// Additional spec files, relative to this file's directory.
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

fn default_timeout() -> u64 {
    300
}

fn default_kill_grace_ms() -> u64 {
    2000
}

fn default_max_output_bytes() -> usize {
    100_000
}

fn default_results_file() -> PathBuf {
    PathBuf::from(".testharness/results.json")
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            slots: None,
            default_timeout: default_timeout(),
            kill_grace_ms: default_kill_grace_ms(),
            max_output_bytes: default_max_output_bytes(),
            race_check: RaceCheckMode::default(),
            pedantic_checks: false,
            max_failures: None,
            run_budget: None,
            results_file: default_results_file(),
            include: Vec::new(),
        }
    }
}

/// `[test.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TestConfig {
    /// Which tester validates the result.
    #[serde(default, rename = "type")]
    pub tester: TesterType,

    /// Shell command line; mutually exclusive with `command`.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Argument vector executed directly; mutually exclusive with `cmd`.
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Working directory relative to the spec file's directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Tests in the same file that must pass first (`"ALL"` for all others).
    #[serde(default)]
    pub prereq: Vec<String>,

    /// Files this test is expected to create or modify.
    #[serde(default)]
    pub modified_files: Vec<PathBuf>,

    #[serde(default = "default_one")]
    pub processors: usize,

    #[serde(default = "default_one")]
    pub threads: usize,

    /// Timeout in seconds; falls back to `[harness].default_timeout`.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Reason this test is administratively skipped.
    #[serde(default)]
    pub skip: Option<String>,

    /// Labels used for `--group` filtering.
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub expect_exit_code: i32,

    /// The test passes only if the process is killed by a signal.
    #[serde(default)]
    pub should_crash: bool,

    #[serde(default)]
    pub expect_out: Option<String>,

    #[serde(default)]
    pub absent_out: Option<String>,

    #[serde(default)]
    pub expect_err: Option<String>,

    /// Treat `expect_out` / `absent_out` / `expect_err` as literals.
    #[serde(default)]
    pub match_literal: bool,

    /// Substrings that mark a run as failed; defaults to
    /// [`DEFAULT_ERROR_MESSAGES`] for `run_app`.
    #[serde(default)]
    pub errors: Option<Vec<String>>,

    #[serde(default)]
    pub check_files: Vec<PathBuf>,

    #[serde(default)]
    pub check_not_exists: Vec<PathBuf>,

    /// Remove `modified_files` before the test starts.
    #[serde(default)]
    pub delete_output_before_running: bool,
}

fn default_one() -> usize {
    1
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            tester: TesterType::default(),
            cmd: None,
            command: None,
            working_dir: None,
            prereq: Vec::new(),
            modified_files: Vec::new(),
            processors: 1,
            threads: 1,
            timeout: None,
            skip: None,
            groups: Vec::new(),
            env: BTreeMap::new(),
            expect_exit_code: 0,
            should_crash: false,
            expect_out: None,
            absent_out: None,
            expect_err: None,
            match_literal: false,
            errors: None,
            check_files: Vec::new(),
            check_not_exists: Vec::new(),
            delete_output_before_running: false,
        }
    }
}

impl TestConfig {
    /// Slots consumed while running: processors times threads.
    pub fn slots(&self) -> usize {
        self.processors.saturating_mul(self.threads)
    }

    /// Effective timeout given the harness default.
    pub fn effective_timeout(&self, default_timeout: u64) -> u64 {
        self.timeout.unwrap_or(default_timeout)
    }

    /// Effective list of error substrings for this test.
    pub fn effective_errors(&self) -> Vec<String> {
        match (&self.errors, self.tester) {
            (Some(errors), _) => errors.clone(),
            (None, TesterType::RunApp) => DEFAULT_ERROR_MESSAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            (None, _) => Vec::new(),
        }
    }

    /// Argument vector to execute.
    ///
    /// `cmd` is wrapped in the platform shell; `command` is used as-is.
    pub fn argv(&self) -> Vec<String> {
        if let Some(cmd) = &self.cmd {
            if cfg!(windows) {
                vec!["cmd".to_string(), "/C".to_string(), cmd.clone()]
            } else {
                vec!["sh".to_string(), "-c".to_string(), cmd.clone()]
            }
        } else {
            self.command.clone().unwrap_or_default()
        }
    }
}
