// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledJob`s to the executor
//! - streaming results
//!
//! The core is unit tested without any Tokio, channels, or processes.

use crate::dag::{DependencyGraph, JobRecord, Scheduler};
use crate::engine::event_handlers::{
    commands_for, handle_budget_exhausted, handle_job_finished, handle_shutdown, CoreState,
    CoreStep,
};
use crate::engine::{RuntimeEvent, RuntimeOptions, StopReason};

/// Everything left once the run is over.
#[derive(Debug)]
pub struct RunOutcome {
    /// Terminal record of every job, in name order.
    pub records: Vec<JobRecord>,
    pub graph: DependencyGraph,
    pub stop: Option<StopReason>,
}

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    state: CoreState,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, options: RuntimeOptions) -> Self {
        Self {
            scheduler,
            state: CoreState::default(),
            options,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.stop
    }

    /// Apply administrative skips and dispatch the first wave.
    pub fn start(&mut self) -> CoreStep {
        let step = self.scheduler.start();
        commands_for(&self.scheduler, step)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::JobFinished { job, completion } => handle_job_finished(
                &mut self.scheduler,
                &mut self.state,
                &self.options,
                &job,
                completion,
            ),
            RuntimeEvent::BudgetExhausted => {
                handle_budget_exhausted(&mut self.scheduler, &mut self.state)
            }
            RuntimeEvent::ShutdownRequested => {
                handle_shutdown(&mut self.scheduler, &mut self.state)
            }
        }
    }

    pub fn finish(self) -> RunOutcome {
        RunOutcome {
            records: self.scheduler.records(),
            graph: self.scheduler.graph().clone(),
            stop: self.state.stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dag::{JobCompletion, JobSpec, JobStatus, SlotPool};
    use crate::engine::CoreCommand;

    fn core(max_failures: Option<usize>) -> CoreRuntime {
        let mut b = JobSpec::new("b", vec!["true".into()]);
        b.prereqs = vec!["a".into()];
        let specs = vec![
            JobSpec::new("a", vec!["true".into()]),
            b,
            JobSpec::new("c", vec!["true".into()]),
        ];
        let scheduler = Scheduler::new(specs, Arc::new(SlotPool::new(1))).unwrap();
        CoreRuntime::new(scheduler, RuntimeOptions { max_failures })
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .flat_map(|c| match c {
                CoreCommand::DispatchJobs(jobs) => jobs.iter().map(|j| j.name.clone()).collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    #[test]
    fn max_failures_skips_pending_jobs() {
        let mut core = core(Some(1));
        let first = core.start();
        assert_eq!(dispatched(&first), vec!["a"]);

        let step = core.step(RuntimeEvent::JobFinished {
            job: "a".into(),
            completion: JobCompletion::new(JobStatus::Failed),
        });
        assert!(!step.keep_running);
        assert!(dispatched(&step).is_empty());
        assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
        assert_eq!(core.stop_reason(), Some(StopReason::MaxFailures));
        assert_eq!(core.scheduler().status_of("c"), Some(JobStatus::Skipped));
        assert_eq!(
            core.scheduler().job("b").and_then(|j| j.reason.clone()).as_deref(),
            Some("skipped dependency: a (FAILED)")
        );
    }

    #[test]
    fn shutdown_cancels_pending_and_kills_running() {
        let mut core = core(None);
        core.start();

        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(step.keep_running);
        assert!(matches!(step.commands.last(), Some(CoreCommand::CancelRunning)));
        assert_eq!(core.scheduler().status_of("b"), Some(JobStatus::Cancelled));

        let done = core.step(RuntimeEvent::JobFinished {
            job: "a".into(),
            completion: JobCompletion::new(JobStatus::Cancelled),
        });
        assert!(!done.keep_running);
        let outcome = core.finish();
        assert_eq!(outcome.stop, Some(StopReason::Interrupted));
        assert!(outcome.records.iter().all(|r| r.status == JobStatus::Cancelled));
    }

    #[test]
    fn repeated_shutdown_escalates_to_kill() {
        let mut core = core(None);
        core.start();

        let first = core.step(RuntimeEvent::ShutdownRequested);
        assert!(matches!(first.commands.last(), Some(CoreCommand::CancelRunning)));

        let second = core.step(RuntimeEvent::ShutdownRequested);
        assert!(second.keep_running);
        assert!(matches!(second.commands.as_slice(), [CoreCommand::KillRunning]));

        core.step(RuntimeEvent::JobFinished {
            job: "a".into(),
            completion: JobCompletion::new(JobStatus::Cancelled),
        });
        let late = core.step(RuntimeEvent::ShutdownRequested);
        assert!(!late.keep_running);
        assert!(!late
            .commands
            .iter()
            .any(|c| matches!(c, CoreCommand::KillRunning)));
        assert_eq!(core.stop_reason(), Some(StopReason::Interrupted));
    }
}
