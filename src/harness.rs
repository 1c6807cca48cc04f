// src/harness.rs

//! One harness invocation: effective settings, job construction, the run
//! itself, the race check and the results file.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::validate::expanded_prereqs;
use crate::config::{load_from_path, load_suite, HarnessSection, Suite};
use crate::dag::job::{epoch_secs, job_name};
use crate::dag::{JobName, JobRecord, JobSpec, JobStatus, Scheduler, SlotPool, FILTERED_REASON};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, StopReason};
use crate::errors::{HarnessError, Result};
use crate::exec::{ExecutorOptions, RealExecutorBackend, Runner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::race::{RaceChecker, RaceSet};
use crate::report::{
    compute_exit_code, load_results, render_report, write_results, HarnessInfo, ReportOptions,
    ResultSink, ResultsFile, Stats,
};
use crate::types::RaceCheckMode;

/// Effective settings for one invocation: `[harness]` values with CLI
/// overrides applied.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub spec_path: PathBuf,
    pub slots: usize,
    pub default_timeout: u64,
    pub kill_grace: Duration,
    pub max_output_bytes: usize,
    pub race_check: RaceCheckMode,
    pub pedantic: bool,
    pub max_failures: Option<usize>,
    pub run_budget: Option<Duration>,
    pub results_file: PathBuf,
    pub name_filter: Option<Regex>,
    pub group_filter: Option<String>,
    /// With `--failed-tests`: the previous run's failures.
    pub rerun_only: Option<BTreeSet<JobName>>,
    pub verbose: bool,
}

impl RunContext {
    /// Settings from a `[harness]` section alone.
    pub fn from_harness(spec_path: &Path, root_dir: &Path, h: &HarnessSection) -> Self {
        Self {
            spec_path: spec_path.to_path_buf(),
            slots: h.slots.unwrap_or_else(num_cpus::get).max(1),
            default_timeout: h.default_timeout,
            kill_grace: Duration::from_millis(h.kill_grace_ms),
            max_output_bytes: h.max_output_bytes,
            race_check: h.race_check,
            pedantic: h.pedantic_checks,
            max_failures: h.max_failures,
            run_budget: h.run_budget.map(Duration::from_secs),
            results_file: root_dir.join(&h.results_file),
            name_filter: None,
            group_filter: None,
            rerun_only: None,
            verbose: false,
        }
    }

    /// Apply command line overrides.
    pub fn with_args(mut self, args: &CliArgs) -> Result<Self> {
        if let Some(jobs) = args.jobs {
            if jobs == 0 {
                return Err(HarnessError::ConfigError("--jobs must be >= 1".to_string()));
            }
            self.slots = jobs;
        }
        if let Some(max) = args.max_fails {
            if max == 0 {
                return Err(HarnessError::ConfigError("--max-fails must be >= 1".to_string()));
            }
            self.max_failures = Some(max);
        }
        if let Some(budget) = args.run_budget {
            self.run_budget = Some(Duration::from_secs(budget));
        }
        if let Some(mode) = args.race_check {
            self.race_check = mode;
        }
        self.pedantic |= args.pedantic_checks;
        if let Some(path) = &args.results_file {
            self.results_file = path.clone();
        }
        if let Some(pattern) = &args.name_filter {
            let re = Regex::new(pattern).map_err(|e| {
                HarnessError::ConfigError(format!("invalid --re pattern '{pattern}': {e}"))
            })?;
            self.name_filter = Some(re);
        }
        self.group_filter = args.group.clone();
        self.verbose = args.verbose;
        Ok(self)
    }

    fn is_selected(&self, spec: &JobSpec) -> bool {
        let name_ok = self
            .name_filter
            .as_ref()
            .is_none_or(|re| re.is_match(&spec.name));
        let group_ok = self
            .group_filter
            .as_ref()
            .is_none_or(|g| spec.labels.iter().any(|l| l == g));
        name_ok && group_ok
    }
}

/// Job specs for every test in the suite, with filters applied as skips.
pub fn build_job_specs(suite: &Suite, ctx: &RunContext) -> Vec<JobSpec> {
    let mut specs = Vec::with_capacity(suite.num_tests());

    for group in &suite.groups {
        for (test_name, cfg) in &group.spec.test {
            let prereqs = expanded_prereqs(group.spec.test.keys(), test_name, &cfg.prereq)
                .into_iter()
                .map(|p| job_name(&group.id, p))
                .collect();
            specs.push(JobSpec::from_config(
                group,
                test_name,
                cfg,
                prereqs,
                ctx.default_timeout,
            ));
        }
    }

    let rerun = ctx
        .rerun_only
        .as_ref()
        .map(|failed| with_prerequisites(&specs, failed));

    for spec in specs.iter_mut() {
        let wanted = rerun.as_ref().is_none_or(|names| names.contains(&spec.name));
        if !wanted || !ctx.is_selected(spec) {
            spec.skip = Some(FILTERED_REASON.to_string());
        }
    }

    specs
}

/// Jobs the previous run did not bring to a pass or a skip.
pub fn previous_failures(records: &[JobRecord]) -> BTreeSet<JobName> {
    records
        .iter()
        .filter(|r| r.status.is_failure() || r.status == JobStatus::Cancelled)
        .map(|r| r.name.clone())
        .collect()
}

/// `roots` plus everything they transitively depend on.
fn with_prerequisites(specs: &[JobSpec], roots: &BTreeSet<JobName>) -> BTreeSet<JobName> {
    let prereqs: HashMap<&str, &[JobName]> = specs
        .iter()
        .map(|s| (s.name.as_str(), s.prereqs.as_slice()))
        .collect();

    let mut keep = BTreeSet::new();
    let mut stack: Vec<&str> = roots.iter().map(String::as_str).collect();
    while let Some(name) = stack.pop() {
        if !keep.insert(name.to_string()) {
            continue;
        }
        if let Some(deps) = prereqs.get(name) {
            stack.extend(deps.iter().map(String::as_str));
        }
    }
    keep
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub records: Vec<JobRecord>,
    pub races: Vec<RaceSet>,
    pub stop: Option<StopReason>,
    pub wall_secs: f64,
    pub race_check: RaceCheckMode,
    pub exit_code: i32,
}

impl RunReport {
    pub fn render(&self, verbose: bool) -> String {
        render_report(
            &self.records,
            &self.races,
            &ReportOptions {
                verbose,
                race_check: self.race_check,
                wall_secs: self.wall_secs,
                stop: self.stop,
            },
        )
    }

    /// Rebuild a report from a stored results file without running anything.
    pub fn from_results(results: ResultsFile) -> Self {
        let wall_secs = results
            .harness
            .end_time
            .map(|end| (end - results.harness.start_time).max(0.0))
            .unwrap_or(0.0);
        let exit_code = compute_exit_code(
            &results.tests,
            &results.races,
            results.harness.race_check,
            results.harness.stop,
        );
        Self {
            records: results.tests,
            races: results.races,
            stop: results.harness.stop,
            wall_secs,
            race_check: results.harness.race_check,
            exit_code,
        }
    }
}

/// A loaded suite ready to run.
#[derive(Debug, Clone)]
pub struct Harness {
    ctx: RunContext,
    specs: Vec<JobSpec>,
    fs: Arc<dyn FileSystem>,
}

impl Harness {
    pub fn new(ctx: RunContext, specs: Vec<JobSpec>, fs: Arc<dyn FileSystem>) -> Self {
        Self { ctx, specs, fs }
    }

    /// Load the suite named on the command line.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let suite = load_suite(&args.spec)?;
        let mut ctx = RunContext::from_harness(&args.spec, &suite.root_dir, &suite.harness)
            .with_args(args)?;
        if args.failed_tests {
            let previous = load_results(&RealFileSystem, &ctx.results_file)?;
            let failed = previous_failures(&previous.tests);
            info!(
                failed = failed.len(),
                results = %ctx.results_file.display(),
                "re-running previous failures"
            );
            ctx.rerun_only = Some(failed);
        }
        let specs = build_job_specs(&suite, &ctx);
        Ok(Self::new(ctx, specs, Arc::new(RealFileSystem)))
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn specs(&self) -> &[JobSpec] {
        &self.specs
    }

    fn scheduler(&self) -> Result<Scheduler> {
        Scheduler::new(self.specs.clone(), Arc::new(SlotPool::new(self.ctx.slots)))
    }

    /// Validate the job graph and describe it without running anything.
    pub fn dry_run(&self) -> Result<String> {
        let scheduler = self.scheduler()?;
        let mut out = String::new();
        let _ = writeln!(out, "testharness dry-run");
        let _ = writeln!(out, "  slots = {}", self.ctx.slots);
        let _ = writeln!(out, "  race_check = {:?}", self.ctx.race_check);
        let _ = writeln!(out, "\njobs ({}):", self.specs.len());

        for job in scheduler.jobs() {
            let spec = &job.spec;
            let _ = writeln!(out, "  - {}", spec.name);
            let _ = writeln!(out, "      command: {}", spec.command().join(" "));
            let _ = writeln!(out, "      working_dir: {}", spec.working_dir.display());
            let _ = writeln!(
                out,
                "      slots: {} ({} x {})",
                spec.slots(),
                spec.processors,
                spec.threads
            );
            let _ = writeln!(out, "      timeout: {}s", spec.timeout.as_secs());
            let prereqs = scheduler.graph().dependencies_of(&spec.name);
            if !prereqs.is_empty() {
                let _ = writeln!(out, "      prereq: {}", prereqs.join(", "));
            }
            if !spec.modified_files.is_empty() {
                let files: Vec<String> = spec
                    .modified_files
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                let _ = writeln!(out, "      modified_files: {}", files.join(", "));
            }
            if let Some(reason) = &spec.skip {
                let _ = writeln!(out, "      skip: {reason}");
            }
        }
        Ok(out)
    }

    fn results_document(&self, start: SystemTime, end: Option<SystemTime>) -> ResultsFile {
        ResultsFile {
            harness: HarnessInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                start_time: epoch_secs(start),
                end_time: end.map(epoch_secs),
                slots: self.ctx.slots,
                spec: self.ctx.spec_path.clone(),
                race_check: self.ctx.race_check,
                stop: None,
            },
            stats: Stats::default(),
            tests: Vec::new(),
            races: Vec::new(),
        }
    }

    /// Run every job, check for races and persist the results.
    pub async fn run(&self, sink: Box<dyn ResultSink>) -> Result<RunReport> {
        let scheduler = self.scheduler()?;

        let start = SystemTime::now();
        let started = Instant::now();
        write_results(
            self.fs.as_ref(),
            &self.ctx.results_file,
            &self.results_document(start, None),
        )?;

        let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

        let executor = RealExecutorBackend::new(
            rt_tx.clone(),
            ExecutorOptions {
                runner: Runner::new(self.ctx.kill_grace, self.ctx.max_output_bytes),
                pedantic: self.ctx.pedantic,
                fs: Arc::clone(&self.fs),
            },
        );

        let mut background: Vec<JoinHandle<()>> = Vec::new();

        // Ctrl-C → cancel the run; again → kill without grace.
        {
            let tx = rt_tx.clone();
            background.push(tokio::spawn(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                    if tx.send(RuntimeEvent::ShutdownRequested).await.is_err() {
                        return;
                    }
                }
            }));
        }

        if let Some(budget) = self.ctx.run_budget {
            let tx = rt_tx.clone();
            background.push(tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                let _ = tx.send(RuntimeEvent::BudgetExhausted).await;
            }));
        }
        drop(rt_tx);

        info!(
            jobs = self.specs.len(),
            slots = self.ctx.slots,
            spec = %self.ctx.spec_path.display(),
            "starting test run"
        );

        let core = CoreRuntime::new(
            scheduler,
            RuntimeOptions {
                max_failures: self.ctx.max_failures,
            },
        );
        let outcome = Runtime::new(core, rt_rx, executor, sink).run().await;

        for task in background {
            task.abort();
        }
        let outcome = outcome?;

        let races = if self.ctx.race_check == RaceCheckMode::Off {
            Vec::new()
        } else {
            RaceChecker::new(&outcome.graph).check(&outcome.records)
        };
        if !races.is_empty() {
            warn!(sets = races.len(), "race conditions detected");
        }

        let exit_code =
            compute_exit_code(&outcome.records, &races, self.ctx.race_check, outcome.stop);

        let mut document = self.results_document(start, Some(SystemTime::now()));
        document.harness.stop = outcome.stop;
        document.stats = Stats::from_records(&outcome.records);
        document.tests = outcome.records.clone();
        document.races = races.clone();
        write_results(self.fs.as_ref(), &self.ctx.results_file, &document)?;

        Ok(RunReport {
            records: outcome.records,
            races,
            stop: outcome.stop,
            wall_secs: started.elapsed().as_secs_f64(),
            race_check: self.ctx.race_check,
            exit_code,
        })
    }
}

/// Where the results file lives for the given command line, without
/// requiring the spec to be valid.
pub fn results_path(args: &CliArgs) -> PathBuf {
    if let Some(path) = &args.results_file {
        return path.clone();
    }
    let root_dir = crate::config::loader::spec_dir(&args.spec);
    let harness = load_from_path(&args.spec)
        .map(|raw| raw.harness)
        .unwrap_or_default();
    root_dir.join(harness.results_file)
}

/// Load the previous run's results for `--show-last-run`.
pub fn replay(fs: &dyn FileSystem, path: &Path) -> Result<RunReport> {
    let results = load_results(fs, path)?;
    Ok(RunReport::from_results(results))
}
