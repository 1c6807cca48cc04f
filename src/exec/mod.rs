// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`process`] wraps a child process and terminates its process group.
//! - [`runner`] spawns one job process and waits for exit, timeout or
//!   cancellation, capturing bounded output.
//! - [`job_worker`] runs a scheduled job end to end (prepare, snapshot,
//!   run, validate) and reports a `JobFinished` event.
//! - [`executor_loop`] owns the background loop that starts workers and
//!   fans out cancellation (terminate first, kill on a repeat request).
//! - [`backend`] provides the `ExecutorBackend` trait the runtime uses, and
//!   the production `RealExecutorBackend`.

pub mod backend;
pub mod executor_loop;
pub mod job_worker;
pub mod process;
pub mod runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
pub use job_worker::ExecutorOptions;
pub use process::ProcessHandle;
pub use runner::{CancelLevel, ExitKind, Outcome, Runner};
