// src/dag/job.rs

//! Job metadata, status and the records a finished job leaves behind.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::{SpecGroup, TestConfig};
use crate::tester::{Tester, TesterKind};

/// Canonical job name type: `<test>` for the root spec, `<group>.<test>`
/// for included ones.
pub type JobName = String;

/// Skip reason used for jobs removed by `--re` / `--group` filters.
pub const FILTERED_REASON: &str = "filtered out";

/// Lifecycle of a job.
///
/// `Pending -> Running -> {Passed, Failed, Timeout, Crashed, Cancelled}`,
/// or `Pending -> {Skipped, Cancelled}` without ever running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Timeout,
    Crashed,
    Skipped,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Statuses that count as a failed test for reporting and exit codes.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Timeout | JobStatus::Crashed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Passed => "OK",
            JobStatus::Failed => "FAILED",
            JobStatus::Timeout => "TIMEOUT",
            JobStatus::Crashed => "CRASHED",
            JobStatus::Skipped => "SKIPPED",
            JobStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Static description of a job, derived from a `[test.<name>]` section.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: JobName,
    /// Group id of the spec file that declared the test; empty for the root.
    pub group: String,
    pub working_dir: PathBuf,
    /// Direct prerequisites, as full job names.
    pub prereqs: Vec<JobName>,
    /// Declared outputs, resolved against the working directory.
    pub modified_files: Vec<PathBuf>,
    pub processors: usize,
    pub threads: usize,
    pub timeout: Duration,
    /// Administrative skip reason.
    pub skip: Option<String>,
    /// Labels used by `--group`.
    pub labels: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub tester: TesterKind,
}

impl JobSpec {
    /// A plain `run_command` job with default resources; mostly for tests.
    pub fn new(name: impl Into<JobName>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            group: String::new(),
            working_dir: PathBuf::from("."),
            prereqs: Vec::new(),
            modified_files: Vec::new(),
            processors: 1,
            threads: 1,
            timeout: Duration::from_secs(300),
            skip: None,
            labels: Vec::new(),
            env: BTreeMap::new(),
            tester: TesterKind::RunCommand(crate::tester::RunCommand::new(argv)),
        }
    }

    pub fn from_config(
        group: &SpecGroup,
        test_name: &str,
        cfg: &TestConfig,
        prereqs: Vec<JobName>,
        default_timeout: u64,
    ) -> Self {
        let working_dir = match &cfg.working_dir {
            Some(dir) => normalize_path(&group.dir.join(dir)),
            None => normalize_path(&group.dir),
        };

        let modified_files = cfg
            .modified_files
            .iter()
            .map(|f| normalize_path(&working_dir.join(f)))
            .collect();

        let mut env = cfg.env.clone();
        env.entry("OMP_NUM_THREADS".to_string())
            .or_insert_with(|| cfg.threads.to_string());

        Self {
            name: job_name(&group.id, test_name),
            group: group.id.clone(),
            working_dir,
            prereqs,
            modified_files,
            processors: cfg.processors,
            threads: cfg.threads,
            timeout: Duration::from_secs(cfg.effective_timeout(default_timeout)),
            skip: cfg.skip.clone(),
            labels: cfg.groups.clone(),
            env,
            tester: TesterKind::from_config(cfg),
        }
    }

    /// Slots this job holds while running.
    pub fn slots(&self) -> usize {
        self.processors.saturating_mul(self.threads)
    }

    pub fn command(&self) -> Vec<String> {
        self.tester.build_command()
    }
}

/// Full job name for a test declared in the given group.
pub fn job_name(group: &str, test: &str) -> JobName {
    if group.is_empty() {
        test.to_string()
    } else {
        format!("{group}.{test}")
    }
}

/// Lexically normalize a path: drop `.` and resolve `..` against earlier
/// components. Does not touch the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Result of executing (or failing to execute) a dispatched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    /// Terminal status decided by the runner and tester.
    pub status: JobStatus,
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
    /// Captured (and annotated) output.
    pub output: String,
    pub elapsed: Duration,
    /// Files found modified by pedantic checks, on top of the declared ones.
    pub detected_files: Vec<PathBuf>,
    /// Whether a process actually ran.
    pub executed: bool,
}

impl JobCompletion {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            reason: None,
            exit_code: None,
            output: String::new(),
            elapsed: Duration::ZERO,
            detected_files: Vec::new(),
            executed: true,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Job description plus per-run state.
#[derive(Debug, Clone)]
pub struct Job {
    pub spec: JobSpec,
    pub status: JobStatus,
    pub reason: Option<String>,
    pub started_at: Option<SystemTime>,
    pub completion: Option<JobCompletion>,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            spec,
            status: JobStatus::Pending,
            reason: None,
            started_at: None,
            completion: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Declared plus detected modified files, sorted and deduplicated.
    pub fn modified_files(&self) -> Vec<PathBuf> {
        let mut files = self.spec.modified_files.clone();
        if let Some(c) = &self.completion {
            files.extend(c.detected_files.iter().cloned());
        }
        files.sort();
        files.dedup();
        files
    }

    pub fn executed(&self) -> bool {
        self.completion.as_ref().is_some_and(|c| c.executed)
    }

    pub fn record(&self) -> JobRecord {
        let completion = self.completion.as_ref();
        JobRecord {
            name: self.spec.name.clone(),
            status: self.status,
            reason: self.reason.clone(),
            start_time: self.started_at.map(epoch_secs),
            elapsed_secs: completion.map(|c| c.elapsed.as_secs_f64()).unwrap_or(0.0),
            exit_code: completion.and_then(|c| c.exit_code),
            slots: self.spec.slots(),
            output: completion.map(|c| c.output.clone()).unwrap_or_default(),
            modified_files: self
                .modified_files()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            executed: self.executed(),
        }
    }
}

/// Seconds since the Unix epoch, as stored in the results file.
pub fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Serializable snapshot of a job in terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: JobName,
    pub status: JobStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub elapsed_secs: f64,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub slots: usize,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub modified_files: Vec<String>,
    #[serde(default)]
    pub executed: bool,
}

/// A job the scheduler wants executed now.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub name: JobName,
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    pub slots: usize,
    pub modified_files: Vec<PathBuf>,
    pub tester: TesterKind,
}

impl ScheduledJob {
    pub fn from_spec(spec: &JobSpec) -> Self {
        Self {
            name: spec.name.clone(),
            command: spec.command(),
            working_dir: spec.working_dir.clone(),
            env: spec.env.clone(),
            timeout: spec.timeout,
            slots: spec.slots(),
            modified_files: spec.modified_files.clone(),
            tester: spec.tester.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize_path(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize_path(Path::new("./out.e")), PathBuf::from("out.e"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn job_names_are_prefixed_by_group() {
        assert_eq!(job_name("", "mesh"), "mesh");
        assert_eq!(job_name("kernels", "diffusion"), "kernels.diffusion");
    }

    #[test]
    fn status_classification() {
        assert!(JobStatus::Timeout.is_failure());
        assert!(JobStatus::Crashed.is_failure());
        assert!(!JobStatus::Skipped.is_failure());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert_eq!(JobStatus::Passed.to_string(), "OK");
    }
}
