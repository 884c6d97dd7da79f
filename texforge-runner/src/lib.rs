//! TexForge Runner
//!
//! The compilation engine: everything between an admitted job and its
//! terminal outcome.
//!
//! Architecture:
//! - Extract: safe archive extraction with path and size checks
//! - Process: subprocess execution bound to a job deadline
//! - Pipeline: staging, multi-pass build, bibliography step, publishing
//! - Service: per-job resources around the pipeline
//!
//! The engine is used in-process by the orchestrator, both by its
//! synchronous dispatcher and by its queue worker.

pub mod config;
pub mod deadline;
pub mod extract;
pub mod log;
pub mod pipeline;
pub mod process;
pub mod service;
pub mod workspace;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{ArchiveLimits, RunnerConfig};
pub use deadline::Deadline;
pub use pipeline::{Pipeline, PipelineError};
pub use service::{CompileService, StandardCompileService};
pub use workspace::{ArtifactLayout, WorkDir};
