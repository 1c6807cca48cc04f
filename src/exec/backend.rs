// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! Production uses [`RealExecutorBackend`], which forwards jobs to the
//! executor loop; tests provide a fake that emits `JobFinished` events
//! without spawning processes.

use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;
use crate::errors::Result;

use super::executor_loop::{spawn_executor, ExecutorCommand};
use super::job_worker::ExecutorOptions;

/// Trait abstracting how scheduled jobs are executed.
///
/// Every dispatched job must eventually produce exactly one
/// `RuntimeEvent::JobFinished`, including after `cancel_all`.
pub trait ExecutorBackend: Send {
    /// Dispatch the given jobs for execution.
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Terminate every running job.
    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Kill every running job without waiting out grace periods.
    fn kill_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl RealExecutorBackend {
    /// Spawn the background executor loop and wire it to the runtime.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, options: ExecutorOptions) -> Self {
        let tx = spawn_executor(runtime_tx, options);
        Self { tx }
    }

    fn send(
        &self,
        command: ExecutorCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(command)
                .await
                .map_err(|_| anyhow!("executor loop is gone"))?;
            Ok(())
        })
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(ExecutorCommand::Run(job))
                    .await
                    .map_err(|_| anyhow!("executor loop is gone"))?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send(ExecutorCommand::CancelAll)
    }

    fn kill_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send(ExecutorCommand::KillAll)
    }
}
