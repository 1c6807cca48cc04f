// tests/runner_process.rs
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, TestResult};

use std::path::Path;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::sync::watch;

use testharness::dag::ScheduledJob;
use testharness::exec::{CancelLevel, ExitKind, Runner};
use testharness_test_utils::JobSpecBuilder;

fn sh_job(dir: &Path, script: &str, timeout: Duration) -> ScheduledJob {
    let spec = JobSpecBuilder::sh("job", script)
        .working_dir(dir)
        .timeout(timeout)
        .build();
    ScheduledJob::from_spec(&spec)
}

/// Whether `pid` names a live (non-zombie) process.
fn is_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Err(Errno::ESRCH) => false,
        _ => {
            // Reparented zombies linger until init reaps them.
            let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
            match stat.rsplit_once(") ") {
                Some((_, rest)) => !rest.starts_with('Z'),
                None => !cfg!(target_os = "linux"),
            }
        }
    }
}

async fn wait_until_gone(pid: i32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn timeout_kills_the_whole_process_group() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let job = sh_job(
        dir.path(),
        "sleep 30 >/dev/null 2>&1 & echo $! > grandchild.pid; wait",
        Duration::from_secs(1),
    );
    let runner = Runner::new(Duration::from_millis(500), 10_000);
    let (_cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);

    let started = Instant::now();
    let outcome = runner.run(&job, cancel_rx).await;

    assert_eq!(outcome.kind, ExitKind::TimedOut);
    assert!(outcome.elapsed >= Duration::from_secs(1), "{:?}", outcome.elapsed);
    assert!(outcome.elapsed < Duration::from_secs(3), "{:?}", outcome.elapsed);
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid: i32 = std::fs::read_to_string(dir.path().join("grandchild.pid"))?
        .trim()
        .parse()?;
    assert!(wait_until_gone(pid).await, "grandchild {pid} survived the timeout");
    Ok(())
}

#[tokio::test]
async fn cancellation_terminates_running_job() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let job = sh_job(dir.path(), "sleep 30", Duration::from_secs(60));
    let runner = Runner::new(Duration::from_millis(500), 10_000);
    let (cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);

    let run = tokio::spawn(async move { runner.run(&job, cancel_rx).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel_tx.send_replace(CancelLevel::Terminate);

    let outcome = tokio::time::timeout(Duration::from_secs(10), run).await??;
    assert_eq!(outcome.kind, ExitKind::Cancelled);
    assert!(outcome.elapsed < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn second_cancel_request_skips_the_grace_period() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let job = sh_job(
        dir.path(),
        "trap '' TERM; echo ready > ready.txt; while :; do sleep 1; done",
        Duration::from_secs(60),
    );
    let runner = Runner::new(Duration::from_secs(30), 10_000);
    let (cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);

    let ready = dir.path().join("ready.txt");
    let run = tokio::spawn(async move { runner.run(&job, cancel_rx).await });
    let deadline = Instant::now() + Duration::from_secs(5);
    while !ready.exists() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel_tx.send_replace(CancelLevel::Terminate);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!run.is_finished(), "SIGTERM should be ignored by the job");

    cancel_tx.send_replace(CancelLevel::Kill);
    let outcome = tokio::time::timeout(Duration::from_secs(10), run).await??;
    assert_eq!(outcome.kind, ExitKind::Cancelled);
    assert!(outcome.elapsed < Duration::from_secs(10), "{:?}", outcome.elapsed);
    Ok(())
}

#[tokio::test]
async fn exit_code_and_streams_are_captured() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let job = sh_job(
        dir.path(),
        "echo to-stdout; echo to-stderr >&2; exit 3",
        Duration::from_secs(10),
    );
    let (_cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);
    let outcome = Runner::default().run(&job, cancel_rx).await;

    assert_eq!(outcome.kind, ExitKind::Exited(3));
    assert_eq!(outcome.exit_code(), Some(3));
    assert_eq!(outcome.stdout, "to-stdout\n");
    assert_eq!(outcome.stderr, "to-stderr\n");
    assert_eq!(outcome.combined_output(), "to-stdout\nto-stderr\n");
    Ok(())
}

#[tokio::test]
async fn death_by_signal_is_reported() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let job = sh_job(dir.path(), "kill -KILL $$", Duration::from_secs(10));
    let (_cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);
    let outcome = Runner::default().run(&job, cancel_rx).await;

    assert_eq!(outcome.kind, ExitKind::Signaled(9));
    assert_eq!(outcome.exit_code(), None);
    Ok(())
}

#[tokio::test]
async fn missing_program_is_a_spawn_failure() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let spec = JobSpecBuilder::new("ghost").working_dir(dir.path()).build();
    let mut job = ScheduledJob::from_spec(&spec);
    job.command = vec!["/definitely/not/a/real/program".to_string()];

    let (_cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);
    let outcome = Runner::default().run(&job, cancel_rx).await;

    assert!(
        matches!(outcome.kind, ExitKind::SpawnFailed(ref msg) if msg.contains("spawning")),
        "got {:?}",
        outcome.kind
    );
    Ok(())
}

#[tokio::test]
async fn long_output_keeps_head_and_tail() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let job = sh_job(
        dir.path(),
        "echo FIRST; i=0; while [ $i -lt 2000 ]; do echo filler-line-$i; i=$((i+1)); done; echo LAST",
        Duration::from_secs(30),
    );
    let runner = Runner::new(Duration::from_millis(500), 200);
    let (_cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);
    let outcome = runner.run(&job, cancel_rx).await;

    assert_eq!(outcome.kind, ExitKind::Exited(0));
    assert!(outcome.stdout.starts_with("FIRST\n"));
    assert!(outcome.stdout.ends_with("LAST\n"));
    assert!(outcome.stdout.contains("bytes truncated"));
    assert!(outcome.stdout.len() < 400);
    Ok(())
}
