// tests/runtime_fake_executor.rs

mod common;
use crate::common::{init_tracing, with_timeout, TestResult};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;

use testharness::dag::{JobSpec, JobStatus, Scheduler, SlotPool};
use testharness::engine::{CoreRuntime, RunOutcome, Runtime, RuntimeEvent, RuntimeOptions, StopReason};
use testharness::race::RaceChecker;
use testharness::report::compute_exit_code;
use testharness::report::exit_code::{EXIT_INTERRUPTED, EXIT_STOPPED_EARLY, EXIT_TEST_FAILURE};
use testharness::types::RaceCheckMode;
use testharness_test_utils::{FakeExecutor, JobSpecBuilder, RecordingSink};

fn core(specs: Vec<JobSpec>, slots: usize, options: RuntimeOptions) -> CoreRuntime {
    let scheduler =
        Scheduler::new(specs, Arc::new(SlotPool::new(slots))).expect("valid job graph");
    CoreRuntime::new(scheduler, options)
}

fn status(outcome: &RunOutcome, name: &str) -> Option<JobStatus> {
    outcome
        .records
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.status)
}

#[tokio::test]
async fn failed_prerequisite_skips_dependent_without_race() -> TestResult {
    init_tracing();

    // A -> B, both claim out.txt. A fails, so B never runs.
    let specs = vec![
        JobSpecBuilder::new("A").modified_file("/work/out.txt").build(),
        JobSpecBuilder::new("B")
            .prereq("A")
            .modified_file("/work/out.txt")
            .build(),
    ];

    let (tx, rx) = mpsc::channel(16);
    let executor = FakeExecutor::new(tx.clone()).with_outcome("A", JobStatus::Failed);
    let stats = executor.stats();
    let sink = RecordingSink::new();

    let runtime = Runtime::new(
        core(specs, 2, RuntimeOptions::default()),
        rx,
        executor,
        Box::new(sink.clone()),
    );
    let outcome = with_timeout(runtime.run()).await?;

    assert_eq!(stats.lock().unwrap().executed, vec!["A".to_string()]);
    assert_eq!(status(&outcome, "A"), Some(JobStatus::Failed));
    assert_eq!(status(&outcome, "B"), Some(JobStatus::Skipped));

    let b = outcome.records.iter().find(|r| r.name == "B").unwrap();
    assert_eq!(b.reason.as_deref(), Some("skipped dependency: A (FAILED)"));

    // The stream saw A first, then the skip it caused.
    assert_eq!(sink.names(), vec!["A".to_string(), "B".to_string()]);

    let races = RaceChecker::new(&outcome.graph).check(&outcome.records);
    assert!(races.is_empty());
    assert_eq!(
        compute_exit_code(&outcome.records, &races, RaceCheckMode::Error, outcome.stop),
        EXIT_TEST_FAILURE
    );
    Ok(())
}

#[tokio::test]
async fn slot_pool_bounds_concurrency() -> TestResult {
    init_tracing();

    let specs: Vec<JobSpec> = (0..5)
        .map(|i| JobSpecBuilder::new(&format!("job{i}")).build())
        .collect();

    let (tx, rx) = mpsc::channel(16);
    let executor = FakeExecutor::new(tx.clone()).with_delay(Duration::from_millis(50));
    let stats = executor.stats();

    let runtime = Runtime::new(
        core(specs, 2, RuntimeOptions::default()),
        rx,
        executor,
        Box::new(RecordingSink::new()),
    );
    let outcome = with_timeout(runtime.run()).await?;

    let stats = stats.lock().unwrap().clone();
    assert_eq!(stats.executed.len(), 5);
    assert!(stats.max_running <= 2, "max_running = {}", stats.max_running);
    assert!(stats.max_slots <= 2);
    assert!(outcome
        .records
        .iter()
        .all(|r| r.status == JobStatus::Passed));
    assert_eq!(outcome.stop, None);
    Ok(())
}

#[tokio::test]
async fn multi_slot_job_waits_for_enough_free_slots() -> TestResult {
    init_tracing();

    let specs = vec![
        JobSpecBuilder::new("small1").build(),
        JobSpecBuilder::new("small2").build(),
        JobSpecBuilder::new("wide").slots(3).build(),
    ];

    let (tx, rx) = mpsc::channel(16);
    let executor = FakeExecutor::new(tx.clone()).with_delay(Duration::from_millis(20));
    let stats = executor.stats();

    let runtime = Runtime::new(
        core(specs, 3, RuntimeOptions::default()),
        rx,
        executor,
        Box::new(RecordingSink::new()),
    );
    let outcome = with_timeout(runtime.run()).await?;

    let stats = stats.lock().unwrap().clone();
    assert_eq!(stats.executed.len(), 3);
    assert!(stats.max_slots <= 3, "max_slots = {}", stats.max_slots);
    assert_eq!(status(&outcome, "wide"), Some(JobStatus::Passed));
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_running_and_pending_jobs() -> TestResult {
    init_tracing();

    let specs = vec![
        JobSpecBuilder::new("a").build(),
        JobSpecBuilder::new("b").build(),
        JobSpecBuilder::new("c").prereq("a").build(),
    ];

    let (tx, rx) = mpsc::channel(16);
    let executor = FakeExecutor::new(tx.clone()).hold();
    let stats = executor.stats();

    let runtime = Runtime::new(
        core(specs, 2, RuntimeOptions::default()),
        rx,
        executor,
        Box::new(RecordingSink::new()),
    );
    let handle = tokio::spawn(runtime.run());

    with_timeout(async {
        while stats.lock().unwrap().running < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    tx.send(RuntimeEvent::ShutdownRequested).await?;
    let outcome = with_timeout(handle).await??;

    assert_eq!(outcome.stop, Some(StopReason::Interrupted));
    for name in ["a", "b", "c"] {
        assert_eq!(status(&outcome, name), Some(JobStatus::Cancelled), "{name}");
    }
    let c = outcome.records.iter().find(|r| r.name == "c").unwrap();
    assert_eq!(c.reason.as_deref(), Some("interrupted"));
    assert!(!c.executed);

    let code = compute_exit_code(&outcome.records, &[], RaceCheckMode::Warn, outcome.stop);
    assert_ne!(code & EXIT_INTERRUPTED, 0);
    Ok(())
}

#[tokio::test]
async fn max_failures_stops_dispatch() -> TestResult {
    init_tracing();

    let specs: Vec<JobSpec> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|n| JobSpecBuilder::new(n).build())
        .collect();

    let (tx, rx) = mpsc::channel(16);
    let executor = FakeExecutor::new(tx.clone()).with_outcome("a", JobStatus::Failed);
    let stats = executor.stats();

    // One slot: "a" runs alone and its failure closes dispatch.
    let runtime = Runtime::new(
        core(
            specs,
            1,
            RuntimeOptions {
                max_failures: Some(1),
            },
        ),
        rx,
        executor,
        Box::new(RecordingSink::new()),
    );
    let outcome = with_timeout(runtime.run()).await?;

    assert_eq!(stats.lock().unwrap().executed, vec!["a".to_string()]);
    assert_eq!(outcome.stop, Some(StopReason::MaxFailures));
    for name in ["b", "c", "d"] {
        assert_eq!(status(&outcome, name), Some(JobStatus::Skipped), "{name}");
    }

    let code = compute_exit_code(&outcome.records, &[], RaceCheckMode::Warn, outcome.stop);
    assert_eq!(code, EXIT_TEST_FAILURE | EXIT_STOPPED_EARLY);
    Ok(())
}

#[tokio::test]
async fn budget_exhaustion_skips_pending_jobs() -> TestResult {
    init_tracing();

    let specs = vec![
        JobSpecBuilder::new("first").build(),
        JobSpecBuilder::new("second").prereq("first").build(),
    ];

    let (tx, rx) = mpsc::channel(16);
    let executor = FakeExecutor::new(tx.clone()).with_delay(Duration::from_millis(100));

    let runtime = Runtime::new(
        core(specs, 1, RuntimeOptions::default()),
        rx,
        executor,
        Box::new(RecordingSink::new()),
    );
    let handle = tokio::spawn(runtime.run());

    tx.send(RuntimeEvent::BudgetExhausted).await?;
    let outcome = with_timeout(handle).await??;

    assert_eq!(outcome.stop, Some(StopReason::BudgetExhausted));
    // The running job finishes on its own; the pending one never starts.
    assert_eq!(status(&outcome, "first"), Some(JobStatus::Passed));
    assert_eq!(status(&outcome, "second"), Some(JobStatus::Skipped));
    Ok(())
}
