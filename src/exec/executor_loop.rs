// src/exec/executor_loop.rs

//! Main executor loop that manages running job processes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::dag::{JobName, ScheduledJob};
use crate::engine::RuntimeEvent;
use crate::exec::job_worker::{run_job, ExecutorOptions};
use crate::exec::runner::CancelLevel;

/// Requests from the runtime to the executor loop.
#[derive(Debug)]
pub enum ExecutorCommand {
    Run(ScheduledJob),
    /// Stop every running job; each still reports a completion.
    CancelAll,
    /// Like `CancelAll`, but without waiting out the grace period.
    KillAll,
}

/// Internal handle for a currently-running job.
///
/// - `cancel` raises how hard the worker stops its process group.
/// - `handle` is the Tokio task that is actually running the job.
struct ActiveJob {
    cancel: watch::Sender<CancelLevel>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each scheduled job is executed in its own Tokio task, which reports back
/// with exactly one `RuntimeEvent::JobFinished`.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    options: ExecutorOptions,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(64);
    let options = Arc::new(options);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<JobName, ActiveJob> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, job| !job.handle.is_finished());

            match command {
                ExecutorCommand::Run(job) => {
                    start_job(job, &options, &mut active, &runtime_tx);
                }
                ExecutorCommand::CancelAll => cancel_all(&active, CancelLevel::Terminate),
                ExecutorCommand::KillAll => cancel_all(&active, CancelLevel::Kill),
            }
        }

        // Dropping the senders makes any remaining worker kill its job.
        info!(remaining = active.len(), "executor loop finished (channel closed)");
    });

    tx
}

fn start_job(
    job: ScheduledJob,
    options: &Arc<ExecutorOptions>,
    active: &mut HashMap<JobName, ActiveJob>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let name = job.name.clone();
    let (cancel_tx, cancel_rx) = watch::channel(CancelLevel::None);
    let options = Arc::clone(options);
    let rt_tx = runtime_tx.clone();
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_job(job, options, rt_tx, cancel_rx).await;
        debug!(job = %spawn_name, "job worker finished");
    });

    active.insert(
        name,
        ActiveJob {
            cancel: cancel_tx,
            handle,
        },
    );
}

fn cancel_all(active: &HashMap<JobName, ActiveJob>, level: CancelLevel) {
    info!(running = active.len(), ?level, "cancelling all running jobs");

    for (name, job) in active.iter() {
        let raised = job.cancel.send_if_modified(|current| {
            if *current < level {
                *current = level;
                true
            } else {
                false
            }
        });
        if !raised {
            debug!(job = %name, ?level, "job already cancelled at this level");
        }
    }
}
