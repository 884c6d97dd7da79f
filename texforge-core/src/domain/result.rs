//! Compile result types

use serde::{Deserialize, Serialize};

use super::artifact;
use super::job::{JobId, JobStatus};

/// Message of a pipeline fault that escaped every stage
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal compilation error";

/// Message of a job whose deadline fired first
pub const TIMEOUT_MESSAGE: &str = "Compilation timed out";

/// Body returned to the caller once a job resolves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub job_id: JobId,
}

impl CompileResult {
    /// True when the job left anything under the output area
    pub fn has_artifacts(&self) -> bool {
        self.logs_url.is_some() || self.pdf_url.is_some()
    }
}

/// Terminal state of a job together with the body reported for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub result: CompileResult,
}

impl JobOutcome {
    /// A job that published its rendered output
    pub fn completed(id: JobId) -> Self {
        Self {
            status: JobStatus::Completed,
            result: CompileResult {
                success: true,
                message: Some("Compilation completed successfully".to_string()),
                logs_url: Some(artifact::logs_url(&id)),
                pdf_url: Some(artifact::pdf_url(&id)),
                job_id: id,
            },
        }
    }

    /// A failed job; `with_log` says whether a compile log was written
    pub fn failed(id: JobId, message: impl Into<String>, with_log: bool) -> Self {
        Self::unsuccessful(JobStatus::Failed, id, message.into(), with_log)
    }

    /// A job cut off by its deadline
    pub fn timed_out(id: JobId, with_log: bool) -> Self {
        Self::unsuccessful(JobStatus::TimedOut, id, TIMEOUT_MESSAGE.to_string(), with_log)
    }

    /// A job whose execution faulted outside the pipeline's own error paths
    pub fn internal_error(id: JobId) -> Self {
        Self::failed(id, INTERNAL_ERROR_MESSAGE, false)
    }

    fn unsuccessful(status: JobStatus, id: JobId, message: String, with_log: bool) -> Self {
        Self {
            status,
            result: CompileResult {
                success: false,
                message: Some(message),
                logs_url: with_log.then(|| artifact::logs_url(&id)),
                pdf_url: None,
                job_id: id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> JobId {
        JobId::parse("0123456789ab").unwrap()
    }

    #[test]
    fn test_completed_outcome_points_at_both_artifacts() {
        let outcome = JobOutcome::completed(id());
        assert_eq!(outcome.status, JobStatus::Completed);
        assert!(outcome.result.success);
        assert_eq!(
            outcome.result.pdf_url.as_deref(),
            Some("/files/0123456789ab.pdf")
        );
        assert!(outcome.result.has_artifacts());
    }

    #[test]
    fn test_failure_without_log_has_no_artifacts() {
        let outcome = JobOutcome::internal_error(id());
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(!outcome.result.success);
        assert!(!outcome.result.has_artifacts());
    }

    #[test]
    fn test_result_json_omits_missing_urls() {
        let outcome = JobOutcome::timed_out(id(), false);
        let value = serde_json::to_value(&outcome.result).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], TIMEOUT_MESSAGE);
        assert_eq!(value["job_id"], "0123456789ab");
        assert!(value.get("logs_url").is_none());
        assert!(value.get("pdf_url").is_none());
    }
}
