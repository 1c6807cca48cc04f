// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{info, warn};

use crate::dag::{JobCompletion, JobRecord, JobStatus, ScheduledJob, Scheduler, SchedulerStep};
use crate::engine::{RuntimeOptions, StopReason};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these jobs to the executor.
    DispatchJobs(Vec<ScheduledJob>),
    /// Emit these terminal records on the results stream.
    Report(Vec<JobRecord>),
    /// Terminate every running job (SIGTERM, grace period, SIGKILL).
    CancelRunning,
    /// Kill every running job right away.
    KillRunning,
    /// Every job is terminal; the run is over.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Mutable bookkeeping the handlers share.
#[derive(Debug, Default)]
pub struct CoreState {
    pub failures: usize,
    /// Shutdown requests seen so far.
    pub interrupts: usize,
    pub stop: Option<StopReason>,
}

/// Turn a scheduler step into shell commands.
pub fn commands_for(scheduler: &Scheduler, step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();
    if !step.finished.is_empty() {
        commands.push(CoreCommand::Report(step.finished));
    }
    if !step.dispatched.is_empty() {
        commands.push(CoreCommand::DispatchJobs(step.dispatched));
    }

    let keep_running = !scheduler.is_finished();
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}

/// Merge two scheduler steps that happened back to back.
fn merge(mut first: SchedulerStep, second: SchedulerStep) -> SchedulerStep {
    first.dispatched.extend(second.dispatched);
    first.finished.extend(second.finished);
    first.run_just_finished = second.run_just_finished;
    first
}

/// Handle a job completion.
///
/// Counts failures and stops dispatching once `max_failures` is reached;
/// undispatched jobs are then skipped.
pub fn handle_job_finished(
    scheduler: &mut Scheduler,
    state: &mut CoreState,
    options: &RuntimeOptions,
    job: &str,
    completion: JobCompletion,
) -> CoreStep {
    let counts = completion.status.is_failure()
        && scheduler.status_of(job) == Some(JobStatus::Running);
    let hits_limit = counts
        && state.stop.is_none()
        && options
            .max_failures
            .is_some_and(|max| state.failures + 1 >= max);

    // Close dispatch first so nothing starts in the slots this job frees.
    if hits_limit {
        scheduler.pause_dispatch();
    }

    let mut step = scheduler.step_completion(job, completion);
    if counts {
        state.failures += 1;
    }

    if hits_limit {
        warn!(failures = state.failures, "maximum failures reached; no new jobs will start");
        state.stop = Some(StopReason::MaxFailures);
        let stopped = scheduler.stop_dispatch(JobStatus::Skipped, "max failures reached");
        step = merge(step, stopped);
    }

    commands_for(scheduler, step)
}

/// Handle the global run budget expiring.
///
/// Running jobs finish under their own timeouts; pending jobs are skipped.
pub fn handle_budget_exhausted(scheduler: &mut Scheduler, state: &mut CoreState) -> CoreStep {
    if state.stop.is_none() {
        info!("run time budget exhausted; no new jobs will start");
        state.stop = Some(StopReason::BudgetExhausted);
    }
    let step = scheduler.stop_dispatch(JobStatus::Skipped, "run time budget exhausted");
    commands_for(scheduler, step)
}

/// Handle Ctrl-C: cancel pending jobs and terminate running ones. A repeat
/// request kills whatever is still running without a grace period.
///
/// Killed jobs still report a completion, so the loop keeps running until
/// every job is terminal.
pub fn handle_shutdown(scheduler: &mut Scheduler, state: &mut CoreState) -> CoreStep {
    state.interrupts += 1;
    let running = scheduler.running_jobs().len();

    if state.interrupts > 1 {
        warn!(running, "shutdown requested again; killing running jobs");
        let mut core_step = commands_for(scheduler, SchedulerStep::default());
        if core_step.keep_running {
            core_step.commands.push(CoreCommand::KillRunning);
        }
        return core_step;
    }

    info!(running, "shutdown requested; cancelling run");
    state.stop = Some(StopReason::Interrupted);

    let step = scheduler.stop_dispatch(JobStatus::Cancelled, "interrupted");
    let mut core_step = commands_for(scheduler, step);
    if core_step.keep_running {
        core_step.commands.push(CoreCommand::CancelRunning);
    }
    core_step
}
