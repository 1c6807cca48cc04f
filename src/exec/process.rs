// src/exec/process.rs

//! Child process handle with process-group termination.
//!
//! Every job runs as the leader of its own process group, so a kill
//! reaches everything the job started (shell wrappers, MPI launchers and
//! their ranks) and not just the direct child.

use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

/// A spawned job process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    /// Pid of the child, which is also its process group id on Unix.
    pid: Option<u32>,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Wait for the direct child to exit.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the whole process tree.
    ///
    /// Unix: SIGTERM to the group, up to `grace` for the leader to exit,
    /// then SIGKILL to the group. `escalate` resolving cuts the grace period
    /// short. Elsewhere the direct child is killed.
    pub async fn terminate_tree<F>(&mut self, grace: Duration, escalate: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::Signal;

            let pgid = pid as i32;
            if signal_group(pgid, Signal::SIGTERM)? {
                tokio::select! {
                    waited = tokio::time::timeout(grace, self.child.wait()) => {
                        if waited.is_err() {
                            debug!(pgid, ?grace, "grace period elapsed; sending SIGKILL");
                        }
                    }
                    _ = escalate => debug!(pgid, "kill requested during grace period"),
                }
                signal_group(pgid, Signal::SIGKILL)?;
            }
            self.child.wait().await?;
            return Ok(());
        }

        let _ = (grace, escalate);
        if let Err(e) = self.child.start_kill() {
            // The child may have exited on its own in the meantime.
            if e.kind() != io::ErrorKind::InvalidInput {
                return Err(e);
            }
        }
        self.child.wait().await?;
        Ok(())
    }

    /// Kill whatever the job left running in its group after the leader
    /// exited on its own.
    pub fn reap_group(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::Signal;

            match signal_group(pid as i32, Signal::SIGKILL) {
                Ok(true) => debug!(pgid = pid, "killed leftover processes in job group"),
                Ok(false) => {}
                Err(e) => warn!(pgid = pid, error = %e, "failed to kill leftover job processes"),
            }
        }
    }
}

/// Send `signal` to a process group. `Ok(false)` if the group is gone.
#[cfg(unix)]
fn signal_group(pgid: i32, signal: nix::sys::signal::Signal) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        // Groups holding only zombies report EPERM on macOS.
        Err(Errno::EPERM) if cfg!(target_os = "macos") => Ok(false),
        Err(e) => Err(io::Error::from(e)),
    }
}
