//! Artifact naming
//!
//! An artifact set is the rendered PDF plus the compile log of one job,
//! published under the shared output area and addressed by job ID.

use super::job::JobId;

/// Extension of the rendered output
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Extension of the compile log
pub const LOG_EXTENSION: &str = "log";

/// File name of a job's compile log inside the logs directory
pub fn log_file_name(id: &JobId) -> String {
    format!("{}.{}", id, LOG_EXTENSION)
}

/// File name of a job's rendered output inside the files directory
pub fn artifact_file_name(id: &JobId) -> String {
    format!("{}.{}", id, ARTIFACT_EXTENSION)
}

/// Logical URL a client fetches the compile log from
pub fn logs_url(id: &JobId) -> String {
    format!("/logs/{}", log_file_name(id))
}

/// Logical URL a client fetches the rendered output from
pub fn pdf_url(id: &JobId) -> String {
    format!("/files/{}", artifact_file_name(id))
}
