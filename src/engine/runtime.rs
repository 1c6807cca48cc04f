// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledJob;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::report::ResultSink;

use super::core::{CoreRuntime, RunOutcome};
use super::{CoreCommand, RuntimeEvent};

/// Drives the scheduler in response to `RuntimeEvent`s and delegates
/// actual command execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. It waits on the event channel and never sleeps.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    sink: Box<dyn ResultSink>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        sink: Box<dyn ResultSink>,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            sink,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches the first wave.
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Executes commands returned by the core until every job is terminal.
    pub async fn run(mut self) -> Result<RunOutcome> {
        info!("testharness runtime started");

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!(
                        running = ?self.core.scheduler().running_jobs(),
                        "runtime event channel closed before every job finished"
                    );
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }
            keep_running = step.keep_running;
        }

        info!("runtime exiting");
        Ok(self.core.finish())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchJobs(jobs) => self.spawn_ready(jobs).await?,
            CoreCommand::Report(records) => {
                for record in &records {
                    self.sink.job_finished(record);
                }
            }
            CoreCommand::CancelRunning => self.executor.cancel_all().await?,
            CoreCommand::KillRunning => self.executor.kill_all().await?,
            CoreCommand::RequestExit => debug!("core issued RequestExit command"),
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, jobs: Vec<ScheduledJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = jobs.iter().map(|j| j.name.as_str()).collect();
        debug!(?names, "spawning ready jobs");

        self.executor.spawn_ready_jobs(jobs).await
    }
}
