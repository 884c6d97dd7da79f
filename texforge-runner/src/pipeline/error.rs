//! Pipeline errors
//!
//! Each variant renders the fixed message reported to the caller. The
//! underlying detail goes to the job log and process logs only.

use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to create work directory")]
    WorkDir(#[source] std::io::Error),

    #[error("Failed to create .tex file")]
    WriteSource(#[source] std::io::Error),

    #[error("Failed to extract ZIP file")]
    Extract(#[source] ExtractError),

    #[error("Main file not found: {0}")]
    MainFileNotFound(String),

    #[error("main parameter is required for ZIP files with multiple .tex files")]
    AmbiguousMainFile,

    /// A fatal toolchain pass exited non-zero or could not be started
    #[error("{}", pass_failure_message(.pass))]
    PassFailed { pass: usize },

    #[error("PDF file was not generated")]
    MissingArtifact,

    #[error("Failed to save PDF")]
    Publish(#[source] std::io::Error),

    #[error("Compilation timed out")]
    Timeout,

    #[error("Internal compilation error")]
    Internal(String),
}

impl PipelineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout)
    }
}

/// Caller-facing message of a failed pass; the last pass is the final one
fn pass_failure_message(pass: &usize) -> String {
    match *pass {
        1 => "LaTeX compilation failed".to_string(),
        p if p >= super::PASSES => "LaTeX compilation failed in final pass".to_string(),
        p => format!("LaTeX compilation failed in pass {}", p),
    }
}
