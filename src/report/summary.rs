// src/report/summary.rs

//! End-of-run report.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::dag::{JobRecord, JobStatus};
use crate::engine::StopReason;
use crate::race::RaceSet;
use crate::report::{is_filtered, LINE_WIDTH};
use crate::types::RaceCheckMode;

/// Lines of output shown per failed job.
const FAILURE_TAIL_LINES: usize = 40;
/// Entries in the "longest running" list.
const LONGEST_JOBS: usize = 5;

/// Aggregate numbers, also stored in the results file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub num_passed: usize,
    pub num_failed: usize,
    pub num_skipped: usize,
    #[serde(default)]
    pub num_cancelled: usize,
    pub num_total: usize,
    /// Sum of job run times, in seconds.
    pub time_total: f64,
    pub time_max: f64,
    pub time_average: f64,
}

impl Stats {
    pub fn from_records(records: &[JobRecord]) -> Self {
        let mut stats = Stats {
            num_total: records.len(),
            ..Stats::default()
        };
        let mut executed = 0usize;

        for r in records {
            match r.status {
                JobStatus::Passed => stats.num_passed += 1,
                JobStatus::Skipped => stats.num_skipped += 1,
                JobStatus::Cancelled => stats.num_cancelled += 1,
                s if s.is_failure() => stats.num_failed += 1,
                _ => {}
            }
            if r.executed {
                executed += 1;
                stats.time_total += r.elapsed_secs;
                stats.time_max = stats.time_max.max(r.elapsed_secs);
            }
        }
        if executed > 0 {
            stats.time_average = stats.time_total / executed as f64;
        }
        stats
    }

    /// Jobs that actually ran.
    pub fn num_run(&self) -> usize {
        self.num_passed + self.num_failed
    }
}

/// Knobs for [`render_report`].
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub verbose: bool,
    pub race_check: RaceCheckMode,
    /// Wall-clock duration of the whole run.
    pub wall_secs: f64,
    pub stop: Option<StopReason>,
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    let start = all.len().saturating_sub(lines);
    let mut out = String::new();
    if start > 0 {
        let _ = writeln!(out, "[... {start} lines omitted ...]");
    }
    for line in &all[start..] {
        let _ = writeln!(out, "{line}");
    }
    out
}

fn stop_note(stop: StopReason) -> &'static str {
    match stop {
        StopReason::Interrupted => "Run interrupted; remaining tests were cancelled.",
        StopReason::MaxFailures => "Maximum failures reached; remaining tests were skipped.",
        StopReason::BudgetExhausted => "Run time budget exhausted; remaining tests were skipped.",
    }
}

/// Consolidated report: failure output, skip reasons, slowest jobs, totals
/// and races.
pub fn render_report(records: &[JobRecord], races: &[RaceSet], opts: &ReportOptions) -> String {
    let mut out = String::new();
    let rule = "-".repeat(LINE_WIDTH);

    let failed: Vec<&JobRecord> = records
        .iter()
        .filter(|r| r.status.is_failure() || (r.status == JobStatus::Cancelled && r.executed))
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "\nFailed tests:");
        for r in &failed {
            let reason = r.reason.as_deref().unwrap_or("");
            let _ = writeln!(out, "\n{rule}\n{} [{} {reason}]\n{rule}", r.name, r.status);
            out.push_str(&tail(&r.output, FAILURE_TAIL_LINES));
        }
    }

    let skipped: Vec<&JobRecord> = records
        .iter()
        .filter(|r| r.status == JobStatus::Skipped && (opts.verbose || !is_filtered(r)))
        .collect();
    if !skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped tests:");
        for r in skipped {
            let _ = writeln!(out, "  {}: {}", r.name, r.reason.as_deref().unwrap_or("skipped"));
        }
    }

    if opts.verbose {
        let mut ran: Vec<&JobRecord> = records.iter().filter(|r| r.executed).collect();
        ran.sort_by(|a, b| {
            b.elapsed_secs
                .total_cmp(&a.elapsed_secs)
                .then_with(|| a.name.cmp(&b.name))
        });
        if !ran.is_empty() {
            let _ = writeln!(out, "\nLongest running tests:");
            for r in ran.iter().take(LONGEST_JOBS) {
                let _ = writeln!(out, "  {:>8.2}s  {}", r.elapsed_secs, r.name);
            }
        }
    }

    let stats = Stats::from_records(records);
    let _ = writeln!(out, "\n{rule}");
    let mut line = format!(
        "Ran {} tests in {:.1} seconds. {} passed, {} skipped",
        stats.num_run(),
        opts.wall_secs,
        stats.num_passed,
        stats.num_skipped
    );
    if stats.num_cancelled > 0 {
        let _ = write!(line, ", {} cancelled", stats.num_cancelled);
    }
    let _ = write!(line, ", {} FAILED", stats.num_failed);
    let _ = writeln!(out, "{line}");
    if let Some(stop) = opts.stop {
        let _ = writeln!(out, "{}", stop_note(stop));
    }

    if opts.race_check != RaceCheckMode::Off && !races.is_empty() {
        let label = match opts.race_check {
            RaceCheckMode::Error => "ERROR",
            _ => "WARNING",
        };
        let _ = writeln!(
            out,
            "\n{label}: race conditions detected.\n\
             The following tests modified the same files without a prereq between them:"
        );
        for set in races {
            let _ = writeln!(out, "\n  {}", set.jobs.join(", "));
            for file in &set.files {
                let _ = writeln!(out, "    - {file}");
            }
        }
    }

    out
}
