// src/exec/job_worker.rs

//! Executes one scheduled job end to end and reports the completion.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::dag::{JobCompletion, JobStatus, ScheduledJob};
use crate::engine::RuntimeEvent;
use crate::exec::runner::{CancelLevel, ExitKind, Runner};
use crate::fs::FileSystem;
use crate::pedantic::{self, Snapshot};
use crate::tester::{self, Tester};

/// Settings shared by every worker.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub runner: Runner,
    /// Snapshot working directories to detect modified files.
    pub pedantic: bool,
    pub fs: Arc<dyn FileSystem>,
}

/// Run `job` and send exactly one `JobFinished` event for it.
pub async fn run_job(
    job: ScheduledJob,
    options: Arc<ExecutorOptions>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: watch::Receiver<CancelLevel>,
) {
    let completion = execute(&job, &options, cancel_rx).await;

    info!(
        job = %job.name,
        status = %completion.status,
        exit_code = completion.exit_code,
        elapsed_secs = completion.elapsed.as_secs_f64(),
        "job finished"
    );

    if runtime_tx
        .send(RuntimeEvent::JobFinished {
            job: job.name.clone(),
            completion,
        })
        .await
        .is_err()
    {
        warn!(job = %job.name, "runtime gone; dropping job completion");
    }
}

async fn execute(
    job: &ScheduledJob,
    options: &ExecutorOptions,
    cancel_rx: watch::Receiver<CancelLevel>,
) -> JobCompletion {
    if let Err(e) = job.tester.prepare(options.fs.as_ref(), &job.modified_files) {
        warn!(job = %job.name, error = %e, "failed to prepare job");
        let mut completion = JobCompletion::new(JobStatus::Failed).with_reason("PREPARE FAILED");
        completion.output = format!("{e:#}\n");
        completion.executed = false;
        return completion;
    }

    let before = if options.pedantic {
        snapshot(Arc::clone(&options.fs), job.working_dir.clone()).await
    } else {
        None
    };

    let outcome = options.runner.run(job, cancel_rx).await;

    let detected_files = match before {
        Some(before) => match snapshot(Arc::clone(&options.fs), job.working_dir.clone()).await {
            Some(after) => pedantic::diff(&before, &after),
            None => Vec::new(),
        },
        None => Vec::new(),
    };

    let verdict = tester::evaluate(&job.tester, &outcome, options.fs.as_ref(), &job.working_dir);

    JobCompletion {
        status: verdict.status,
        reason: verdict.reason,
        exit_code: outcome.exit_code(),
        output: verdict.output,
        elapsed: outcome.elapsed,
        detected_files,
        executed: !matches!(outcome.kind, ExitKind::SpawnFailed(_)),
    }
}

async fn snapshot(fs: Arc<dyn FileSystem>, dir: PathBuf) -> Option<Snapshot> {
    let shown = dir.display().to_string();
    match tokio::task::spawn_blocking(move || pedantic::snapshot_dir(fs.as_ref(), &dir)).await {
        Ok(Ok(snapshot)) => Some(snapshot),
        Ok(Err(e)) => {
            warn!(dir = %shown, error = %e, "working dir snapshot failed");
            None
        }
        Err(e) => {
            warn!(dir = %shown, error = %e, "snapshot task panicked");
            None
        }
    }
}
