// src/engine/mod.rs

//! Orchestration engine for a test run.
//!
//! This module ties together:
//! - the job scheduler and slot pool
//! - the main runtime event loop that reacts to:
//!   - job completion events from workers
//!   - the global run budget expiring
//!   - shutdown signals (Ctrl-C)
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use serde::{Deserialize, Serialize};

use crate::dag::{JobCompletion, JobName};

/// Runtime options used by the core.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Stop dispatching after this many failed jobs.
    pub max_failures: Option<usize>,
}

/// Why the run stopped dispatching before every job got its chance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Interrupted,
    MaxFailures,
    BudgetExhausted,
}

/// Events flowing into the runtime from workers, timers and signals.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched job reached a terminal status.
    JobFinished {
        job: JobName,
        completion: JobCompletion,
    },
    /// The global wall-clock budget ran out.
    BudgetExhausted,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::{CoreRuntime, RunOutcome};
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
