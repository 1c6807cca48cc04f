use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use testharness::dag::{JobCompletion, JobStatus, ScheduledJob};
use testharness::engine::RuntimeEvent;
use testharness::errors::Result;
use testharness::exec::ExecutorBackend;

/// What the fake executor observed.
#[derive(Debug, Default, Clone)]
pub struct FakeExecutorStats {
    /// Job names in dispatch order.
    pub executed: Vec<String>,
    pub running: usize,
    /// Highest number of jobs that were running at once.
    pub max_running: usize,
    /// Highest number of slots that were in use at once.
    pub max_slots: usize,
    slots_in_use: usize,
}

/// A fake executor that:
/// - records which jobs were "run" and how many overlapped
/// - completes each job after `delay` with a scripted status (default
///   `Passed`), or with `Cancelled` once `cancel_all` is called.
///
/// With `hold()`, jobs never finish on their own.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    stats: Arc<Mutex<FakeExecutorStats>>,
    outcomes: HashMap<String, JobStatus>,
    delay: Option<Duration>,
    cancel_tx: watch::Sender<bool>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            runtime_tx,
            stats: Arc::new(Mutex::new(FakeExecutorStats::default())),
            outcomes: HashMap::new(),
            delay: Some(Duration::from_millis(10)),
            cancel_tx,
        }
    }

    /// Finish `job` with `status` instead of `Passed`.
    pub fn with_outcome(mut self, job: &str, status: JobStatus) -> Self {
        self.outcomes.insert(job.to_string(), status);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Jobs only finish when cancelled.
    pub fn hold(mut self) -> Self {
        self.delay = None;
        self
    }

    pub fn stats(&self) -> Arc<Mutex<FakeExecutorStats>> {
        Arc::clone(&self.stats)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        for job in jobs {
            {
                let mut stats = self.stats.lock().unwrap();
                stats.executed.push(job.name.clone());
                stats.running += 1;
                stats.slots_in_use += job.slots;
                stats.max_running = stats.max_running.max(stats.running);
                stats.max_slots = stats.max_slots.max(stats.slots_in_use);
            }

            let tx = self.runtime_tx.clone();
            let stats = Arc::clone(&self.stats);
            let status = self
                .outcomes
                .get(&job.name)
                .copied()
                .unwrap_or(JobStatus::Passed);
            let delay = self.delay;
            let mut cancel_rx = self.cancel_tx.subscribe();

            tokio::spawn(async move {
                let finish = async {
                    match delay {
                        Some(d) => tokio::time::sleep(d).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                let status = tokio::select! {
                    _ = finish => status,
                    _ = cancel_rx.wait_for(|cancelled| *cancelled) => JobStatus::Cancelled,
                };

                {
                    let mut stats = stats.lock().unwrap();
                    stats.running -= 1;
                    stats.slots_in_use -= job.slots;
                }

                let mut completion = JobCompletion::new(status);
                completion.exit_code = (status == JobStatus::Passed).then_some(0);
                let _ = tx
                    .send(RuntimeEvent::JobFinished {
                        job: job.name.clone(),
                        completion,
                    })
                    .await;
            });
        }

        Box::pin(async { Ok(()) })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.cancel_tx.send_replace(true);
        Box::pin(async { Ok(()) })
    }

    /// Fake jobs have no grace period, so this is the same as `cancel_all`.
    fn kill_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.cancel_all()
    }
}
