//! Job registry
//!
//! Tracks the jobs currently compiling in this process. It bounds
//! concurrency and answers introspection queries, nothing more: it is not
//! persisted and does not survive a restart.
//!
//! Reads (`count`, `snapshot`) share the lock; `add`, `try_add` and
//! `remove` take it exclusively.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use texforge_core::domain::job::{JobId, Toolchain};
use texforge_core::dto::job::RunningTask;

#[derive(Debug, Clone)]
struct RunningJob {
    toolchain: Toolchain,
    started_at: Instant,
}

/// Registry of in-flight jobs
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, RunningJob>>,
    max_concurrent: usize,
    timeout: Duration,
}

impl JobRegistry {
    /// Creates an empty registry
    ///
    /// # Arguments
    /// * `max_concurrent` - Admission ceiling
    /// * `timeout` - Per-job deadline, used to report remaining time
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            max_concurrent,
            timeout,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Registers a job regardless of the ceiling
    pub fn add(&self, id: JobId, toolchain: Toolchain) {
        self.jobs.write().insert(
            id,
            RunningJob {
                toolchain,
                started_at: Instant::now(),
            },
        );
    }

    /// Registers a job only if the ceiling has not been reached
    ///
    /// The check and the insert happen under one write lock, so two
    /// concurrent submissions cannot both take the last slot.
    pub fn try_add(&self, id: JobId, toolchain: Toolchain) -> bool {
        let mut jobs = self.jobs.write();
        if jobs.len() >= self.max_concurrent {
            return false;
        }
        jobs.insert(
            id,
            RunningJob {
                toolchain,
                started_at: Instant::now(),
            },
        );
        true
    }

    /// Removes a job; unknown IDs are ignored
    pub fn remove(&self, id: &JobId) {
        self.jobs.write().remove(id);
    }

    /// Every in-flight job with its elapsed and remaining seconds
    ///
    /// Remaining time floors at zero.
    pub fn snapshot(&self) -> Vec<RunningTask> {
        let now = Instant::now();
        let mut tasks: Vec<RunningTask> = self
            .jobs
            .read()
            .iter()
            .map(|(id, job)| {
                let elapsed = now.saturating_duration_since(job.started_at);
                RunningTask {
                    job_id: id.clone(),
                    compiler: job.toolchain,
                    elapsed_time: elapsed.as_secs_f64(),
                    remaining_time: self.timeout.saturating_sub(elapsed).as_secs_f64(),
                }
            })
            .collect();
        tasks.sort_by(|a, b| b.elapsed_time.total_cmp(&a.elapsed_time));
        tasks
    }
}
