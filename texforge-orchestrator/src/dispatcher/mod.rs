//! Job dispatcher
//!
//! Takes one upload from validation to a terminal outcome:
//! - Validate the upload, with no side effects
//! - Admit it against the registry's ceiling, or shed it
//! - Run the compile service under the job's deadline
//! - Release the registry slot and schedule artifact cleanup
//!
//! The job runs on its own task and reports back over a one-shot channel,
//! so a caller that goes away never strands a registry entry or skips a
//! cleanup.

mod validate;

pub use validate::{Upload, ValidationError, validate};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::registry::JobRegistry;
use crate::retention::CleanupScheduler;
use texforge_core::domain::job::{CompileJob, JobId};
use texforge_core::domain::result::JobOutcome;
use texforge_core::dto::job::CapacityRejection;
use texforge_runner::{CompileService, Deadline};

/// Reasons a submission never became a job
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Server overloaded")]
    Capacity(CapacityRejection),
}

/// Synchronous front door: one request, one job, one outcome
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    service: Arc<dyn CompileService>,
    cleanup: CleanupScheduler,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<JobRegistry>,
        service: Arc<dyn CompileService>,
        cleanup: CleanupScheduler,
    ) -> Self {
        Self {
            registry,
            service,
            cleanup,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Validates, admits and compiles an upload
    pub async fn dispatch(&self, upload: Upload) -> Result<JobOutcome, DispatchError> {
        let (toolchain, payload) = validate(upload)?;
        let job = CompileJob::new(toolchain, payload);
        let id = job.id.clone();

        if !self.registry.try_add(id.clone(), toolchain) {
            let running = self.registry.snapshot();
            warn!(
                "Capacity reached ({} running), rejecting submission",
                running.len()
            );
            return Err(DispatchError::Capacity(CapacityRejection::new(
                self.registry.max_concurrent(),
                running,
            )));
        }

        info!(
            "[{}] Admitted ({}, main {}), {} running",
            id,
            toolchain,
            job.payload.main_file_label(),
            self.registry.count()
        );

        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.run(job).await;
            // The caller may be gone; the job is finished either way
            let _ = tx.send(outcome);
        });

        Ok(rx.await.unwrap_or_else(|_| JobOutcome::internal_error(id)))
    }

    async fn run(&self, job: CompileJob) -> JobOutcome {
        let id = job.id.clone();
        let outcome = execute(self.service.clone(), job, self.registry.timeout()).await;

        self.registry.remove(&id);
        if outcome.result.has_artifacts() {
            self.cleanup.schedule(id.clone());
        }

        info!(
            "[{}] Finished: {}, {} running",
            id,
            outcome.status,
            self.registry.count()
        );
        outcome
    }
}

/// Runs a job under a fresh deadline of `timeout`
///
/// The compile service and the deadline race; whichever resolves first
/// decides the outcome. On expiry the deadline is cancelled, which kills the
/// running subprocess; the compile task then finishes its own cleanup in the
/// background and its result is dropped. A panic inside the service becomes
/// a generic failure.
pub async fn execute(
    service: Arc<dyn CompileService>,
    job: CompileJob,
    timeout: Duration,
) -> JobOutcome {
    let id = job.id.clone();
    let deadline = Deadline::after(timeout);

    let mut task = {
        let service = service.clone();
        let deadline = deadline.clone();
        tokio::spawn(async move { service.compile(job, deadline).await })
    };

    tokio::select! {
        biased;

        joined = &mut task => match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[{}] Compile task failed: {}", id, e);
                JobOutcome::internal_error(id)
            }
        },
        _ = deadline.expired() => {
            deadline.cancel();
            warn!("[{}] Deadline of {:?} reached", id, timeout);
            let with_log = log_exists(service.as_ref(), &id).await;
            JobOutcome::timed_out(id, with_log)
        }
    }
}

async fn log_exists(service: &dyn CompileService, id: &JobId) -> bool {
    tokio::fs::try_exists(service.layout().log_path(id))
        .await
        .unwrap_or(false)
}
