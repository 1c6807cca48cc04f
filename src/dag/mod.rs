// src/dag/mod.rs

//! Job graph and scheduling.
//!
//! - [`graph`] holds the dependency graph, checked for cycles on insert.
//! - [`job`] provides job metadata, statuses and result records.
//! - [`slots`] is the processor slot pool shared with workers.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   jobs are ready and admits them against the slot pool.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod job;
pub mod scheduler;
pub mod scheduler_step;
pub mod slots;
pub mod state_manager;

pub use graph::DependencyGraph;
pub use job::{
    Job, JobCompletion, JobName, JobRecord, JobSpec, JobStatus, ScheduledJob, FILTERED_REASON,
};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use slots::SlotPool;
