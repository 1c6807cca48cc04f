// src/exec/runner.rs

//! Runs one job process to completion, timeout or cancellation.

use std::collections::VecDeque;
use std::future::pending;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::ScheduledJob;
use crate::exec::process::ProcessHandle;

/// How long to keep draining pipes after the process exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a job process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    Exited(i32),
    Signaled(i32),
    TimedOut,
    Cancelled,
    SpawnFailed(String),
}

/// Everything the runner observed about one execution.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub kind: ExitKind,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl Outcome {
    pub fn spawn_failed(err: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            kind: ExitKind::SpawnFailed(err.into()),
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.kind {
            ExitKind::Exited(code) => Some(code),
            _ => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.kind == ExitKind::TimedOut
    }

    /// Stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// A job process plus its output readers.
#[derive(Debug)]
pub struct RunningJob {
    pub name: String,
    pub handle: ProcessHandle,
    started: Instant,
    stdout: CaptureTask,
    stderr: CaptureTask,
}

#[derive(Debug)]
struct CaptureTask {
    buffer: Arc<Mutex<CappedBuffer>>,
    task: Option<JoinHandle<()>>,
}

impl CaptureTask {
    fn spawn<R>(reader: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(CappedBuffer::new(limit)));
        let task = reader.map(|mut reader| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.push(&chunk[..n]);
                            }
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait (bounded) for the reader to hit EOF and return what it captured.
    async fn finish(mut self) -> String {
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                debug!("output pipe still open after exit; abandoning reader");
                abort.abort();
            }
        }
        self.buffer
            .lock()
            .map(|buf| buf.render())
            .unwrap_or_default()
    }
}

/// Byte sink that keeps the first and last `limit / 2` bytes.
#[derive(Debug)]
pub struct CappedBuffer {
    head: Vec<u8>,
    tail: VecDeque<u8>,
    half: usize,
    dropped: usize,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        let half = (limit / 2).max(1);
        Self {
            head: Vec::new(),
            tail: VecDeque::new(),
            half,
            dropped: 0,
        }
    }

    pub fn push(&mut self, mut bytes: &[u8]) {
        if self.head.len() < self.half {
            let take = bytes.len().min(self.half - self.head.len());
            self.head.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
        for &b in bytes {
            if self.tail.len() == self.half {
                self.tail.pop_front();
                self.dropped += 1;
            }
            self.tail.push_back(b);
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from_utf8_lossy(&self.head).into_owned();
        if self.dropped > 0 {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("... [{} bytes truncated] ...\n", self.dropped));
        }
        let tail: Vec<u8> = self.tail.iter().copied().collect();
        out.push_str(&String::from_utf8_lossy(&tail));
        out
    }
}

/// How hard a running job is being asked to stop. Only ever increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CancelLevel {
    #[default]
    None,
    /// SIGTERM, then SIGKILL after the grace period.
    Terminate,
    /// SIGKILL now, even in the middle of a grace period.
    Kill,
}

enum Wake {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Spawns job processes and waits for them.
#[derive(Debug, Clone)]
pub struct Runner {
    /// SIGTERM to SIGKILL grace period.
    pub grace_period: Duration,
    /// Capture limit per stream.
    pub max_output_bytes: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            max_output_bytes: 100_000,
        }
    }
}

impl Runner {
    pub fn new(grace_period: Duration, max_output_bytes: usize) -> Self {
        Self {
            grace_period,
            max_output_bytes,
        }
    }

    /// Start the job in its working directory as a new process group.
    pub fn spawn(&self, job: &ScheduledJob) -> Result<RunningJob> {
        let (program, args) = job
            .command
            .split_first()
            .ok_or_else(|| anyhow!("job '{}' has an empty command", job.name))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&job.working_dir)
            .envs(&job.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "spawning `{}` in {}",
                job.command.join(" "),
                job.working_dir.display()
            )
        })?;

        let stdout = CaptureTask::spawn(child.stdout.take(), self.max_output_bytes);
        let stderr = CaptureTask::spawn(child.stderr.take(), self.max_output_bytes);
        let handle = ProcessHandle::new(child);

        info!(
            job = %job.name,
            pid = handle.pid(),
            timeout_secs = job.timeout.as_secs_f64(),
            "started job process"
        );

        Ok(RunningJob {
            name: job.name.clone(),
            handle,
            started: Instant::now(),
            stdout,
            stderr,
        })
    }

    /// Wait for exit, timeout or cancellation, whichever comes first.
    ///
    /// On timeout or cancellation the process tree is terminated before
    /// this returns. A dropped cancel sender counts as [`CancelLevel::Kill`].
    pub async fn wait(
        &self,
        mut running: RunningJob,
        timeout: Duration,
        mut cancel_rx: watch::Receiver<CancelLevel>,
    ) -> Outcome {
        let wake = tokio::select! {
            status = running.handle.wait() => Wake::Exited(status),
            _ = tokio::time::sleep(timeout) => Wake::TimedOut,
            _ = cancel_rx.wait_for(|level| *level >= CancelLevel::Terminate) => Wake::Cancelled,
        };
        let mut elapsed = running.started.elapsed();

        let kind = match wake {
            Wake::Exited(Ok(status)) => {
                running.handle.reap_group();
                exit_kind(status)
            }
            Wake::Exited(Err(e)) => {
                warn!(job = %running.name, error = %e, "failed to wait for job process");
                if let Err(e) = running.handle.terminate_tree(self.grace_period, pending()).await {
                    warn!(job = %running.name, error = %e, "failed to terminate job process");
                }
                ExitKind::Exited(-1)
            }
            Wake::TimedOut => {
                info!(job = %running.name, ?timeout, "job timed out; terminating process group");
                if let Err(e) = running.handle.terminate_tree(self.grace_period, pending()).await {
                    warn!(job = %running.name, error = %e, "failed to terminate timed-out job");
                }
                ExitKind::TimedOut
            }
            Wake::Cancelled => {
                info!(job = %running.name, "job cancelled; terminating process group");
                let kill = async move {
                    let _ = cancel_rx.wait_for(|level| *level == CancelLevel::Kill).await;
                };
                if let Err(e) = running.handle.terminate_tree(self.grace_period, kill).await {
                    warn!(job = %running.name, error = %e, "failed to terminate cancelled job");
                }
                elapsed = running.started.elapsed();
                ExitKind::Cancelled
            }
        };

        let stdout = running.stdout.finish().await;
        let stderr = running.stderr.finish().await;

        debug!(job = %running.name, ?kind, ?elapsed, "job process finished");

        Outcome {
            kind,
            stdout,
            stderr,
            elapsed,
        }
    }

    /// Spawn and wait; spawn errors become a `SpawnFailed` outcome.
    pub async fn run(&self, job: &ScheduledJob, cancel_rx: watch::Receiver<CancelLevel>) -> Outcome {
        let started = Instant::now();
        match self.spawn(job) {
            Ok(running) => self.wait(running, job.timeout, cancel_rx).await,
            Err(e) => {
                warn!(job = %job.name, error = %e, "failed to spawn job");
                Outcome::spawn_failed(format!("{e:#}"), started.elapsed())
            }
        }
    }
}

fn exit_kind(status: ExitStatus) -> ExitKind {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitKind::Signaled(signal);
        }
    }
    ExitKind::Exited(status.code().unwrap_or(-1))
}
