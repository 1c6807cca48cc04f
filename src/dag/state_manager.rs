// src/dag/state_manager.rs

//! Per-run state transitions for jobs in the scheduler.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::dag::job::{Job, JobName, JobStatus};
use crate::dag::DependencyGraph;

/// Mutable view over the job table used by the scheduler.
pub struct StateManager<'a> {
    graph: &'a DependencyGraph,
    jobs: &'a mut BTreeMap<JobName, Job>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DependencyGraph, jobs: &'a mut BTreeMap<JobName, Job>) -> Self {
        Self { graph, jobs }
    }

    /// Move a pending job to a terminal status without running it.
    ///
    /// Returns `false` if the job is unknown or no longer pending.
    pub fn settle_pending(&mut self, name: &str, status: JobStatus, reason: &str) -> bool {
        match self.jobs.get_mut(name) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = status;
                job.reason = Some(reason.to_string());
                debug!(job = %name, %status, reason, "settled without running");
                true
            }
            Some(_) => false,
            None => {
                warn!(job = %name, "unknown job; cannot settle");
                false
            }
        }
    }

    /// Skip every pending job downstream of `root`, which has reached a
    /// terminal status other than `Passed`.
    ///
    /// Each skipped job names the direct prerequisite that blocked it.
    /// Returns the newly skipped jobs in the order they were visited.
    pub fn skip_dependents_of(&mut self, root: &str) -> Vec<JobName> {
        let mut stack: Vec<(JobName, JobName)> = self
            .graph
            .dependents_of(root)
            .iter()
            .map(|d| (d.clone(), root.to_string()))
            .collect();
        // Visit in name order.
        stack.reverse();

        let mut skipped = Vec::new();

        while let Some((name, blocker)) = stack.pop() {
            let blocker_status = self
                .jobs
                .get(&blocker)
                .map(|j| j.status)
                .unwrap_or(JobStatus::Skipped);
            let reason = format!("skipped dependency: {blocker} ({blocker_status})");

            if self.settle_pending(&name, JobStatus::Skipped, &reason) {
                skipped.push(name.clone());
                let mut next: Vec<_> = self
                    .graph
                    .dependents_of(&name)
                    .iter()
                    .map(|d| (d.clone(), name.clone()))
                    .collect();
                next.reverse();
                stack.extend(next);
            }
        }

        skipped
    }

    /// Skip every pending job whose prerequisites already include a
    /// terminal non-`Passed` job. Used once at start-up after
    /// administrative skips.
    pub fn cascade_all(&mut self) -> Vec<JobName> {
        let roots: Vec<JobName> = self
            .jobs
            .values()
            .filter(|j| j.status.is_terminal() && j.status != JobStatus::Passed)
            .map(|j| j.spec.name.clone())
            .collect();

        let mut skipped = Vec::new();
        for root in roots {
            skipped.extend(self.skip_dependents_of(&root));
        }
        skipped
    }

    /// Mark a job `Running`.
    pub fn mark_running(&mut self, name: &str) -> Option<&Job> {
        let job = self.jobs.get_mut(name)?;
        job.status = JobStatus::Running;
        job.started_at = Some(std::time::SystemTime::now());
        Some(job)
    }
}

/// Read-only queries over the job table.
pub struct ReadOnlyStateManager<'a> {
    graph: &'a DependencyGraph,
    jobs: &'a BTreeMap<JobName, Job>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a DependencyGraph, jobs: &'a BTreeMap<JobName, Job>) -> Self {
        Self { graph, jobs }
    }

    /// Whether every direct prerequisite of `name` has `Passed`.
    pub fn prereqs_passed(&self, name: &str) -> bool {
        self.graph.dependencies_of(name).iter().all(|dep| {
            self.jobs
                .get(dep)
                .is_some_and(|d| d.status == JobStatus::Passed)
        })
    }

    /// Pending jobs whose prerequisites all passed, in name order.
    pub fn ready(&self) -> Vec<JobName> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && self.prereqs_passed(j.name()))
            .map(|j| j.spec.name.clone())
            .collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status == status).count()
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.values().all(|j| j.status.is_terminal())
    }
}
