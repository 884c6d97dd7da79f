//! Compile service
//!
//! Runs one job from start to terminal outcome:
//! - Opening the job's compile log
//! - Creating its working directory
//! - Running the pipeline under the job's deadline
//! - Mapping the pipeline's result to a [`JobOutcome`]
//!
//! The working directory is removed on every exit path. The log and any
//! published PDF stay behind for the retention manager.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::deadline::Deadline;
use crate::log::JobLog;
use crate::pipeline::Pipeline;
use crate::workspace::{ArtifactLayout, WorkDir};
use texforge_core::domain::job::CompileJob;
use texforge_core::domain::result::JobOutcome;

/// Service trait for compiling jobs
#[async_trait]
pub trait CompileService: Send + Sync {
    /// Compiles a job until it reaches a terminal state
    ///
    /// # Arguments
    /// * `job` - The job to compile
    /// * `deadline` - Budget shared by every subprocess of the job
    ///
    /// # Returns
    /// The terminal outcome; failures are outcomes, not errors
    async fn compile(&self, job: CompileJob, deadline: Deadline) -> JobOutcome;

    /// Where jobs work and publish
    fn layout(&self) -> &ArtifactLayout;
}

/// Standard implementation of CompileService
pub struct StandardCompileService {
    pipeline: Pipeline,
    layout: ArtifactLayout,
}

impl StandardCompileService {
    /// Creates a new compile service
    pub fn new(pipeline: Pipeline, layout: ArtifactLayout) -> Self {
        Self { pipeline, layout }
    }
}

#[async_trait]
impl CompileService for StandardCompileService {
    async fn compile(&self, job: CompileJob, deadline: Deadline) -> JobOutcome {
        let CompileJob {
            id,
            toolchain,
            payload,
            ..
        } = job;

        let mut log = JobLog::create(self.layout.log_path(&id)).await;
        if !log.is_written() {
            return JobOutcome::failed(id, "Failed to create log file", false);
        }
        log.line(format!(
            "Starting compilation - Compiler: {}, Main: {}",
            toolchain,
            payload.main_file_label()
        ))
        .await;

        let work = match WorkDir::create(self.layout.work_root(), &id) {
            Ok(work) => work,
            Err(e) => {
                error!("[{}] Failed to create work directory: {}", id, e);
                log.line(format!("Failed to create work directory: {}", e))
                    .await;
                return JobOutcome::failed(id, "Failed to create work directory", true);
            }
        };

        let result = self
            .pipeline
            .run(
                work.path(),
                payload,
                toolchain,
                &self.layout.pdf_path(&id),
                &deadline,
                &mut log,
            )
            .await;

        log.line("Cleaning up temporary files").await;
        drop(work);

        match result {
            Ok(()) => {
                log.line("Compilation completed successfully").await;
                info!("[{}] Compilation completed", id);
                JobOutcome::completed(id)
            }
            Err(e) if e.is_timeout() => {
                log.line(e.to_string()).await;
                warn!("[{}] Compilation timed out", id);
                JobOutcome::timed_out(id, true)
            }
            Err(e) => {
                warn!("[{}] Compilation failed: {:?}", id, e);
                JobOutcome::failed(id, e.to_string(), true)
            }
        }
    }

    fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{FakeToolchain, archive, scripts};
    use std::time::Duration;
    use texforge_core::domain::job::{JobPayload, JobStatus, Toolchain};

    struct Fixture {
        toolchain: FakeToolchain,
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                toolchain: FakeToolchain::new(),
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn service(&self) -> StandardCompileService {
            let layout = ArtifactLayout::new(
                self.root.path().join("processing"),
                self.root.path().join("output"),
            );
            layout.ensure_dirs().unwrap();
            StandardCompileService::new(Pipeline::new(self.toolchain.config()), layout)
        }

        fn work_dirs(&self) -> usize {
            std::fs::read_dir(self.root.path().join("processing"))
                .unwrap()
                .count()
        }
    }

    fn single_file() -> JobPayload {
        JobPayload::SingleFile {
            base_name: "main".to_string(),
            content: b"\\documentclass{article}".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_completed_job_publishes_artifacts() {
        let fx = Fixture::new();
        let service = fx.service();
        let job = CompileJob::new(Toolchain::Xelatex, single_file());
        let id = job.id.clone();

        let outcome = service
            .compile(job, Deadline::after(Duration::from_secs(10)))
            .await;

        assert_eq!(outcome.status, JobStatus::Completed);
        assert!(outcome.result.success);
        assert!(service.layout().pdf_path(&id).exists());
        let log = std::fs::read_to_string(service.layout().log_path(&id)).unwrap();
        assert!(log.contains("Starting compilation - Compiler: xelatex, Main: main"));
        assert!(log.contains("Compilation completed successfully"));
        assert_eq!(fx.work_dirs(), 0);
        assert!(fx.toolchain.invocations()[0].starts_with("xelatex "));
    }

    #[tokio::test]
    async fn test_failed_job_keeps_only_the_log() {
        let fx = Fixture::new();
        fx.toolchain
            .install("pdflatex", &scripts::engine_failing_on_pass(1));
        let service = fx.service();
        let job = CompileJob::new(Toolchain::Pdflatex, single_file());
        let id = job.id.clone();

        let outcome = service
            .compile(job, Deadline::after(Duration::from_secs(10)))
            .await;

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(
            outcome.result.message.as_deref(),
            Some("LaTeX compilation failed")
        );
        assert!(outcome.result.logs_url.is_some());
        assert!(outcome.result.pdf_url.is_none());
        assert!(!service.layout().pdf_path(&id).exists());
        assert_eq!(fx.work_dirs(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_work_dir() {
        let fx = Fixture::new();
        fx.toolchain.install("pdflatex", scripts::HANG);
        let service = fx.service();
        let job = CompileJob::new(Toolchain::Pdflatex, single_file());

        let outcome = service
            .compile(job, Deadline::after(Duration::from_millis(300)))
            .await;

        assert_eq!(outcome.status, JobStatus::TimedOut);
        assert_eq!(outcome.result.message.as_deref(), Some("Compilation timed out"));
        assert_eq!(fx.work_dirs(), 0);
    }

    #[tokio::test]
    async fn test_zip_slip_fails_before_any_pass() {
        let fx = Fixture::new();
        let service = fx.service();
        let payload = JobPayload::Archive {
            data: archive(&[
                ("main.tex", b"x".as_slice()),
                ("../../etc/passthrough", b"pwned".as_slice()),
            ]),
            main_file: Some("main.tex".to_string()),
        };

        let outcome = service
            .compile(
                CompileJob::new(Toolchain::Pdflatex, payload),
                Deadline::after(Duration::from_secs(10)),
            )
            .await;

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(
            outcome.result.message.as_deref(),
            Some("Failed to extract ZIP file")
        );
        assert!(fx.toolchain.invocations().is_empty());
        assert!(!fx.root.path().join("etc/passthrough").exists());
        assert_eq!(fx.work_dirs(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_log_fails_without_log_url() {
        let fx = Fixture::new();
        let layout = ArtifactLayout::new(
            fx.root.path().join("processing"),
            fx.root.path().join("missing"),
        );
        let service = StandardCompileService::new(Pipeline::new(fx.toolchain.config()), layout);

        let outcome = service
            .compile(
                CompileJob::new(Toolchain::Pdflatex, single_file()),
                Deadline::after(Duration::from_secs(10)),
            )
            .await;

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(
            outcome.result.message.as_deref(),
            Some("Failed to create log file")
        );
        assert!(!outcome.result.has_artifacts());
    }
}
