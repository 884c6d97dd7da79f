//! Compilation pipeline
//!
//! Turns a staged working directory into a rendered PDF:
//! - Stage: write the single source file or extract the archive
//! - Pass 1, then the bibliography step, then passes 2 and 3
//! - Check the rendered output exists
//! - Publish it into the shared output area
//!
//! Stages run strictly in order. Every subprocess shares the job's deadline.
//! The pass count is fixed; the build does not try to detect convergence.

mod bibliography;
mod error;
mod stage;

pub use bibliography::BibliographyTool;
pub use error::PipelineError;
pub use stage::MainFile;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::RunnerConfig;
use crate::deadline::Deadline;
use crate::log::JobLog;
use crate::process::{CommandError, run_command};
use texforge_core::domain::job::{JobPayload, Toolchain};

/// Total toolchain passes per build
pub const PASSES: usize = 3;

/// Arguments preceding the main file on every pass
pub const PASS_ARGS: [&str; 2] = ["-interaction=nonstopmode", "-halt-on-error"];

/// The multi-pass build protocol
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: RunnerConfig,
}

impl Pipeline {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Stages `payload` into `work`, builds it, and publishes the PDF to
    /// `publish_to`
    pub async fn run(
        &self,
        work: &Path,
        payload: JobPayload,
        toolchain: Toolchain,
        publish_to: &Path,
        deadline: &Deadline,
        log: &mut JobLog,
    ) -> Result<(), PipelineError> {
        let main = stage::prepare(work, payload, &self.config.archive_limits, log).await?;
        let pdf = self.build(work, &main, toolchain, deadline, log).await?;
        stage::publish(&pdf, publish_to, log).await
    }

    /// Runs every pass plus the bibliography step, returning the path of the
    /// rendered output inside `work`
    pub async fn build(
        &self,
        work: &Path,
        main: &MainFile,
        toolchain: Toolchain,
        deadline: &Deadline,
        log: &mut JobLog,
    ) -> Result<PathBuf, PipelineError> {
        let program = self.config.binary(toolchain.as_str());
        let mut args: Vec<OsString> = PASS_ARGS.iter().map(OsString::from).collect();
        args.push(OsString::from(&main.relative));

        for pass in 1..=PASSES {
            log.line(format!("Starting LaTeX compilation (Pass {})", pass))
                .await;
            self.pass(work, pass, &program, &args, deadline, log)
                .await?;

            if pass == 1 {
                bibliography::resolve(&self.config, work, &main.base, deadline, log).await?;
            }
        }

        let pdf = work.join(main.pdf_name());
        if !tokio::fs::try_exists(&pdf).await.unwrap_or(false) {
            warn!("{} exited cleanly without producing {}", toolchain, main.pdf_name());
            log.line("PDF file was not generated").await;
            return Err(PipelineError::MissingArtifact);
        }

        Ok(pdf)
    }

    async fn pass(
        &self,
        work: &Path,
        pass: usize,
        program: &OsString,
        args: &[OsString],
        deadline: &Deadline,
        log: &mut JobLog,
    ) -> Result<(), PipelineError> {
        match run_command(work, program, args, deadline).await {
            Ok(output) => {
                log.output(format!("Pass {} output", pass), &output.output)
                    .await;
                if output.success() {
                    debug!("Pass {} finished", pass);
                    Ok(())
                } else {
                    log.line(format!("LaTeX pass {} failed: {}", pass, output.status))
                        .await;
                    Err(PipelineError::PassFailed { pass })
                }
            }
            Err(CommandError::TimedOut { .. }) => {
                log.line(format!("LaTeX pass {} timed out", pass)).await;
                Err(PipelineError::Timeout)
            }
            Err(e) => {
                warn!("Pass {} could not run: {}", pass, e);
                log.line(format!("LaTeX pass {} failed: {}", pass, e)).await;
                Err(PipelineError::PassFailed { pass })
            }
        }
    }
}
