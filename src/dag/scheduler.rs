// src/dag/scheduler.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::DependencyGraph;
use crate::dag::job::{Job, JobCompletion, JobName, JobRecord, JobSpec, JobStatus, ScheduledJob};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::slots::SlotPool;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::errors::Result;

/// Scheduler holds the job graph plus mutable per-run state.
///
/// It is responsible for:
/// - deciding which pending jobs are ready (every prerequisite passed)
/// - admitting ready jobs against the [`SlotPool`], biggest fan-out first
/// - recording terminal statuses and releasing slots
/// - skipping the dependents of anything that did not pass
///
/// It performs no IO; the engine feeds it completions and executes the
/// jobs it dispatches.
#[derive(Debug)]
pub struct Scheduler {
    graph: DependencyGraph,
    jobs: BTreeMap<JobName, Job>,
    slots: Arc<SlotPool>,
    /// Number of transitive dependents per job; higher runs first.
    priority: HashMap<JobName, usize>,
    dispatch_open: bool,
}

impl Scheduler {
    /// Build the graph and job table.
    ///
    /// Fails with `DuplicateJob`, `UnknownJob` or `Cycle` before anything
    /// could be dispatched.
    pub fn new(specs: Vec<JobSpec>, slots: Arc<SlotPool>) -> Result<Self> {
        let graph = DependencyGraph::from_specs(&specs)?;

        let priority = graph
            .jobs()
            .map(|name| (name.to_string(), graph.downstream_of(name).len()))
            .collect();

        let jobs = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), Job::new(spec)))
            .collect();

        Ok(Self {
            graph,
            jobs,
            slots,
            priority,
            dispatch_open: true,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn slot_pool(&self) -> &Arc<SlotPool> {
        &self.slots
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    /// All jobs in name order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn status_of(&self, name: &str) -> Option<JobStatus> {
        self.jobs.get(name).map(|j| j.status)
    }

    pub fn running_jobs(&self) -> Vec<JobName> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.spec.name.clone())
            .collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        ReadOnlyStateManager::new(&self.graph, &self.jobs).count(status)
    }

    /// Pending jobs whose prerequisites all passed, in dispatch order.
    pub fn ready_jobs(&self) -> Vec<JobName> {
        let mut ready = ReadOnlyStateManager::new(&self.graph, &self.jobs).ready();
        ready.sort_by(|a, b| {
            let pa = self.priority.get(a).copied().unwrap_or(0);
            let pb = self.priority.get(b).copied().unwrap_or(0);
            pb.cmp(&pa).then_with(|| a.cmp(b))
        });
        ready
    }

    /// Whether every job reached a terminal status.
    pub fn is_finished(&self) -> bool {
        ReadOnlyStateManager::new(&self.graph, &self.jobs).all_terminal()
    }

    /// Whether new jobs may still be dispatched.
    pub fn is_dispatching(&self) -> bool {
        self.dispatch_open
    }

    /// Terminal records for every job, in name order.
    pub fn records(&self) -> Vec<JobRecord> {
        self.jobs.values().map(Job::record).collect()
    }

    /// Apply administrative skips and dispatch the first wave.
    ///
    /// Jobs with a `skip` reason, and jobs that need more slots than the
    /// pool holds, are skipped together with everything downstream.
    pub fn start(&mut self) -> SchedulerStep {
        let max = self.slots.max();
        let admin: Vec<(JobName, String)> = self
            .jobs
            .values()
            .filter_map(|j| {
                if let Some(reason) = &j.spec.skip {
                    Some((j.spec.name.clone(), reason.clone()))
                } else if j.spec.slots() > max {
                    Some((
                        j.spec.name.clone(),
                        format!("needs {} slots, only {max} available", j.spec.slots()),
                    ))
                } else {
                    None
                }
            })
            .collect();

        let mut settled = Vec::new();
        {
            let mut manager = StateManager::new(&self.graph, &mut self.jobs);
            for (name, reason) in admin {
                if manager.settle_pending(&name, JobStatus::Skipped, &reason) {
                    settled.push(name);
                }
            }
            settled.extend(manager.cascade_all());
        }

        info!(
            jobs = self.jobs.len(),
            skipped = settled.len(),
            slots = max,
            "scheduler: starting run"
        );

        let finished = self.records_for(&settled);
        let dispatched = self.dispatch_ready();

        SchedulerStep {
            dispatched,
            finished,
            run_just_finished: self.is_finished(),
        }
    }

    /// Record a running job's completion, release its slots and dispatch
    /// whatever became ready.
    pub fn step_completion(&mut self, name: &str, completion: JobCompletion) -> SchedulerStep {
        let slots = match self.jobs.get_mut(name) {
            Some(job) if job.status == JobStatus::Running => {
                let status = if completion.status.is_terminal() {
                    completion.status
                } else {
                    warn!(job = %name, status = %completion.status, "non-terminal completion; treating as failed");
                    JobStatus::Failed
                };
                job.status = status;
                job.reason = completion.reason.clone();
                job.completion = Some(completion);
                debug!(job = %name, %status, "job completed");
                job.spec.slots()
            }
            Some(job) => {
                warn!(job = %name, status = %job.status, "completion for a job that is not running; ignoring");
                return SchedulerStep::default();
            }
            None => {
                warn!(job = %name, "completion for unknown job; ignoring");
                return SchedulerStep::default();
            }
        };

        self.slots.release(slots);

        let mut settled = vec![name.to_string()];
        if self.status_of(name) != Some(JobStatus::Passed) {
            let mut manager = StateManager::new(&self.graph, &mut self.jobs);
            settled.extend(manager.skip_dependents_of(name));
        }

        let finished = self.records_for(&settled);
        let dispatched = if self.dispatch_open {
            self.dispatch_ready()
        } else {
            Vec::new()
        };

        SchedulerStep {
            dispatched,
            finished,
            run_just_finished: self.is_finished(),
        }
    }

    /// Stop dispatching without settling anything yet.
    pub fn pause_dispatch(&mut self) {
        self.dispatch_open = false;
    }

    /// Stop dispatching and settle every pending job with `status`.
    ///
    /// Running jobs are left alone; their completions are still accepted.
    pub fn stop_dispatch(&mut self, status: JobStatus, reason: &str) -> SchedulerStep {
        self.dispatch_open = false;

        let pending: Vec<JobName> = self
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.spec.name.clone())
            .collect();

        let mut manager = StateManager::new(&self.graph, &mut self.jobs);
        let settled: Vec<JobName> = pending
            .into_iter()
            .filter(|name| manager.settle_pending(name, status, reason))
            .collect();

        info!(%status, reason, settled = settled.len(), "scheduler: dispatch stopped");

        SchedulerStep {
            dispatched: Vec::new(),
            finished: self.records_for(&settled),
            run_just_finished: self.is_finished(),
        }
    }

    /// Admit ready jobs in priority order; a job that does not fit is passed
    /// over so smaller ones behind it can use the free slots.
    fn dispatch_ready(&mut self) -> Vec<ScheduledJob> {
        let mut dispatched = Vec::new();

        for name in self.ready_jobs() {
            let needed = match self.jobs.get(&name) {
                Some(job) => job.spec.slots(),
                None => continue,
            };
            if !self.slots.try_acquire(needed) {
                debug!(job = %name, slots = needed, available = self.slots.available(), "not enough free slots");
                continue;
            }

            let mut manager = StateManager::new(&self.graph, &mut self.jobs);
            if let Some(job) = manager.mark_running(&name) {
                info!(job = %name, slots = needed, "dispatching job");
                dispatched.push(ScheduledJob::from_spec(&job.spec));
            }
        }

        dispatched
    }

    fn records_for(&self, names: &[JobName]) -> Vec<JobRecord> {
        names
            .iter()
            .filter_map(|n| self.jobs.get(n))
            .map(Job::record)
            .collect()
    }
}
