// src/report/exit_code.rs

//! Process exit code as a set of bit flags.

use crate::dag::{JobRecord, JobStatus};
use crate::engine::StopReason;
use crate::race::RaceSet;
use crate::types::RaceCheckMode;

/// A job that was not skipped did not pass.
pub const EXIT_TEST_FAILURE: i32 = 0x01;
/// Races were found and `race_check = "error"`.
pub const EXIT_RACE: i32 = 0x02;
/// The run was interrupted.
pub const EXIT_INTERRUPTED: i32 = 0x04;
/// Dispatch stopped early (max failures or run budget).
pub const EXIT_STOPPED_EARLY: i32 = 0x08;
/// The harness itself failed (results file, executor).
pub const EXIT_HARNESS_ERROR: i32 = 0x40;
/// The spec could not be loaded; nothing ran.
pub const EXIT_CONFIG_ERROR: i32 = 0x80;

pub fn compute_exit_code(
    records: &[JobRecord],
    races: &[RaceSet],
    race_check: RaceCheckMode,
    stop: Option<StopReason>,
) -> i32 {
    let mut code = 0;

    if records
        .iter()
        .any(|r| !matches!(r.status, JobStatus::Passed | JobStatus::Skipped))
    {
        code |= EXIT_TEST_FAILURE;
    }
    if race_check == RaceCheckMode::Error && !races.is_empty() {
        code |= EXIT_RACE;
    }
    match stop {
        Some(StopReason::Interrupted) => code |= EXIT_INTERRUPTED,
        Some(StopReason::MaxFailures) | Some(StopReason::BudgetExhausted) => {
            code |= EXIT_STOPPED_EARLY
        }
        None => {}
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: JobStatus) -> JobRecord {
        JobRecord {
            name: "t".into(),
            status,
            reason: None,
            start_time: None,
            elapsed_secs: 0.0,
            exit_code: None,
            slots: 1,
            output: String::new(),
            modified_files: Vec::new(),
            executed: true,
        }
    }

    #[test]
    fn skips_do_not_fail_the_run() {
        let records = [record(JobStatus::Passed), record(JobStatus::Skipped)];
        assert_eq!(compute_exit_code(&records, &[], RaceCheckMode::Warn, None), 0);
    }

    #[test]
    fn flags_combine() {
        let races = [RaceSet {
            jobs: vec!["a".into(), "b".into()],
            files: vec!["f".into()],
        }];
        let records = [record(JobStatus::Crashed)];
        assert_eq!(
            compute_exit_code(&records, &races, RaceCheckMode::Error, Some(StopReason::MaxFailures)),
            EXIT_TEST_FAILURE | EXIT_RACE | EXIT_STOPPED_EARLY
        );
        assert_eq!(
            compute_exit_code(&[], &races, RaceCheckMode::Warn, None),
            0
        );
    }
}
