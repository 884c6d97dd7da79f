//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobId, JobStatus, Toolchain};

/// One in-flight job as reported by the registry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningTask {
    pub job_id: JobId,
    pub compiler: Toolchain,
    /// Seconds since the job was admitted
    pub elapsed_time: f64,
    /// Seconds left before the job's deadline, never negative
    pub remaining_time: f64,
}

/// Body returned when the admission ceiling is reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRejection {
    pub error: String,
    pub message: String,
    pub running_tasks: Vec<RunningTask>,
}

impl CapacityRejection {
    pub fn new(max_concurrent: usize, running_tasks: Vec<RunningTask>) -> Self {
        Self {
            error: "Server overloaded".to_string(),
            message: format!(
                "Maximum {} concurrent compilations reached",
                max_concurrent
            ),
            running_tasks,
        }
    }
}

/// Body returned when the queue front door accepts a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub status: JobStatus,
    pub message: String,
}

impl QueuedJob {
    pub fn accepted(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            message: "File uploaded successfully, compilation queued".to_string(),
        }
    }
}
