// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::job::{JobRecord, ScheduledJob};

/// Structured result of a single scheduler "step".
///
/// Tests can drive the scheduler by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Jobs that acquired slots and must be executed now.
    pub dispatched: Vec<ScheduledJob>,
    /// Jobs that turned terminal in this step, in the order they did.
    pub finished: Vec<JobRecord>,
    /// Whether this step left every job terminal.
    pub run_just_finished: bool,
}
