// tests/race_checker.rs

mod common;
use crate::common::{init_tracing, with_timeout, TestResult};

use std::sync::Arc;

use tokio::sync::mpsc;

use testharness::dag::{JobRecord, JobSpec, JobStatus, Scheduler, SlotPool};
use testharness::engine::{CoreRuntime, RunOutcome, Runtime, RuntimeOptions};
use testharness::race::RaceChecker;
use testharness::report::compute_exit_code;
use testharness::report::exit_code::EXIT_RACE;
use testharness::types::RaceCheckMode;
use testharness_test_utils::{FakeExecutor, JobSpecBuilder, RecordingSink};

async fn run_all(specs: Vec<JobSpec>, fake: impl FnOnce(FakeExecutor) -> FakeExecutor) -> RunOutcome {
    let scheduler = Scheduler::new(specs, Arc::new(SlotPool::new(4))).expect("valid job graph");
    let (tx, rx) = mpsc::channel(16);
    let runtime = Runtime::new(
        CoreRuntime::new(scheduler, RuntimeOptions::default()),
        rx,
        fake(FakeExecutor::new(tx)),
        Box::new(RecordingSink::new()),
    );
    with_timeout(runtime.run()).await.expect("run completes")
}

#[tokio::test]
async fn unordered_writers_of_same_file_race() -> TestResult {
    init_tracing();

    let specs = vec![
        JobSpecBuilder::new("A").modified_file("/work/out.e").build(),
        JobSpecBuilder::new("B").modified_file("/work/out.e").build(),
    ];
    let outcome = run_all(specs, |f| f).await;

    let checker = RaceChecker::new(&outcome.graph);
    let races = checker.find_races(&outcome.records);
    assert_eq!(races.len(), 1);
    assert_eq!(races[0].first, "A");
    assert_eq!(races[0].second, "B");
    assert_eq!(races[0].files, vec!["/work/out.e".to_string()]);

    let sets = checker.check(&outcome.records);
    assert_eq!(
        compute_exit_code(&outcome.records, &sets, RaceCheckMode::Error, outcome.stop),
        EXIT_RACE
    );
    assert_eq!(
        compute_exit_code(&outcome.records, &sets, RaceCheckMode::Warn, outcome.stop),
        0
    );
    Ok(())
}

#[tokio::test]
async fn transitive_ordering_suppresses_race() -> TestResult {
    init_tracing();

    // first -> middle -> last; first and last share a file.
    let specs = vec![
        JobSpecBuilder::new("first").modified_file("/work/shared.csv").build(),
        JobSpecBuilder::new("middle").prereq("first").build(),
        JobSpecBuilder::new("last")
            .prereq("middle")
            .modified_file("/work/shared.csv")
            .build(),
    ];
    let outcome = run_all(specs, |f| f).await;

    assert!(RaceChecker::new(&outcome.graph).check(&outcome.records).is_empty());
    Ok(())
}

#[tokio::test]
async fn jobs_that_never_ran_do_not_race() -> TestResult {
    init_tracing();

    // "gate" fails, so "writer2" is skipped and never touches the file.
    let specs = vec![
        JobSpecBuilder::new("gate").build(),
        JobSpecBuilder::new("writer1").modified_file("/work/x.txt").build(),
        JobSpecBuilder::new("writer2")
            .prereq("gate")
            .modified_file("/work/x.txt")
            .build(),
    ];
    let outcome = run_all(specs, |f| f.with_outcome("gate", JobStatus::Failed)).await;

    let skipped = outcome.records.iter().find(|r| r.name == "writer2").unwrap();
    assert_eq!(skipped.status, JobStatus::Skipped);
    assert!(RaceChecker::new(&outcome.graph).check(&outcome.records).is_empty());
    Ok(())
}

#[tokio::test]
async fn racing_pairs_are_grouped_and_report_is_stable() -> TestResult {
    init_tracing();

    // a/b share one file, b/c another; d races with nobody.
    let specs = vec![
        JobSpecBuilder::new("a").modified_file("/w/1").build(),
        JobSpecBuilder::new("b")
            .modified_file("/w/1")
            .modified_file("/w/2")
            .build(),
        JobSpecBuilder::new("c").modified_file("/w/2").build(),
        JobSpecBuilder::new("d").modified_file("/w/3").build(),
    ];
    let outcome = run_all(specs, |f| f).await;
    let checker = RaceChecker::new(&outcome.graph);

    let sets = checker.check(&outcome.records);
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].jobs, vec!["a", "b", "c"]);
    assert_eq!(sets[0].files, vec!["/w/1", "/w/2"]);

    // Same input, same answer, regardless of record order.
    let mut shuffled: Vec<JobRecord> = outcome.records.clone();
    shuffled.reverse();
    assert_eq!(checker.check(&shuffled), sets);
    assert_eq!(checker.check(&outcome.records), sets);
    Ok(())
}
