// src/report/mod.rs

//! Everything the user sees after (and while) jobs run.
//!
//! - [`ResultSink`] receives one record per job as it turns terminal.
//! - [`summary`] renders the consolidated end-of-run report.
//! - [`exit_code`] folds the run into the process exit code.
//! - [`results`] persists the run as JSON and loads it back for replay.

pub mod exit_code;
pub mod results;
pub mod summary;

use std::io::Write;

use crate::dag::{JobRecord, JobStatus, FILTERED_REASON};

pub use exit_code::compute_exit_code;
pub use results::{load_results, write_results, HarnessInfo, ResultsFile};
pub use summary::{render_report, ReportOptions, Stats};

/// Width of a result line.
pub const LINE_WIDTH: usize = 80;

/// Results stream: one call per job, in the order jobs turn terminal.
pub trait ResultSink: Send {
    fn job_finished(&mut self, record: &JobRecord);
}

/// Whether a record is hidden from normal output.
pub fn is_filtered(record: &JobRecord) -> bool {
    record.status == JobStatus::Skipped && record.reason.as_deref() == Some(FILTERED_REASON)
}

/// `name ........ STATUS [reason] (1.23s)`
pub fn format_result_line(record: &JobRecord) -> String {
    let mut right = record.status.to_string();
    if let Some(reason) = &record.reason {
        if record.status != JobStatus::Passed && *reason != right {
            right = format!("{right} [{reason}]");
        }
    }
    if record.executed {
        right = format!("{right} ({:.2}s)", record.elapsed_secs);
    }

    let used = record.name.len() + right.len() + 2;
    let dots = LINE_WIDTH.saturating_sub(used).max(3);
    format!("{} {} {}", record.name, ".".repeat(dots), right)
}

/// Writes result lines to stdout (or any writer).
pub struct ConsoleSink<W: Write + Send> {
    out: W,
    verbose: bool,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout(verbose: bool) -> Self {
        Self::new(std::io::stdout(), verbose)
    }
}

impl<W: Write + Send> ResultSink for ConsoleSink<W> {
    fn job_finished(&mut self, record: &JobRecord) {
        if is_filtered(record) && !self.verbose {
            return;
        }
        // Broken pipes must not take the run down with them.
        let _ = writeln!(self.out, "{}", format_result_line(record));
        let _ = self.out.flush();
    }
}

/// Collects records in memory; handy for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<JobRecord>,
}

impl ResultSink for MemorySink {
    fn job_finished(&mut self, record: &JobRecord) {
        self.records.push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: JobStatus, reason: Option<&str>, executed: bool) -> JobRecord {
        JobRecord {
            name: "kernels.diffusion".into(),
            status,
            reason: reason.map(str::to_string),
            start_time: None,
            elapsed_secs: 1.234,
            exit_code: None,
            slots: 1,
            output: String::new(),
            modified_files: Vec::new(),
            executed,
        }
    }

    #[test]
    fn result_line_is_padded_to_width() {
        let line = format_result_line(&record(JobStatus::Passed, None, true));
        assert_eq!(line.len(), LINE_WIDTH);
        assert!(line.starts_with("kernels.diffusion ...."));
        assert!(line.ends_with(" OK (1.23s)"));
    }

    #[test]
    fn skipped_line_has_reason_and_no_time() {
        let line = format_result_line(&record(JobStatus::Skipped, Some("heavy"), false));
        assert!(line.ends_with(" SKIPPED [heavy]"));
    }

    #[test]
    fn filtered_records_are_hidden_unless_verbose() {
        let filtered = record(JobStatus::Skipped, Some(FILTERED_REASON), false);

        let mut quiet = ConsoleSink::new(Vec::new(), false);
        quiet.job_finished(&filtered);
        assert!(quiet.into_inner().is_empty());

        let mut verbose = ConsoleSink::new(Vec::new(), true);
        verbose.job_finished(&filtered);
        assert!(!verbose.into_inner().is_empty());
    }
}
