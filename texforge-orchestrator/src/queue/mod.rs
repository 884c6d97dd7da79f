//! Queue front door
//!
//! Decouples upload acceptance from compute capacity. Submissions are
//! persisted as job records plus a payload file and their IDs pushed onto a
//! FIFO list; a single worker pops and compiles them one at a time while
//! callers poll the record.

mod memory;
mod redis_store;
pub mod store;
mod worker;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{SharedStore, StoreError};
pub use worker::QueueWorker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::dispatcher::{Upload, ValidationError, validate};
use store::{QUEUE_KEY, get_json, record_key, set_json};
use texforge_core::domain::job::{
    ARCHIVE_EXTENSION, JobId, JobPayload, JobRecord, JobStatus, SOURCE_EXTENSION,
};
use texforge_core::dto::job::QueuedJob;
use texforge_runner::ArtifactLayout;

/// Errors raised by the queue front door
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is full, try again later")]
    QueueFull,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request not found or expired")]
    NotFound,

    #[error("PDF not found, expired, or compilation failed")]
    ArtifactNotFound,

    #[error("Failed to save file")]
    SavePayload(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a job's payload waits, for every payload shape
pub fn upload_paths(upload_dir: &Path, id: &JobId) -> [PathBuf; 2] {
    [
        upload_dir.join(format!("{}.{}", id, SOURCE_EXTENSION)),
        upload_dir.join(format!("{}.{}", id, ARCHIVE_EXTENSION)),
    ]
}

/// Accepts submissions and answers status queries
#[derive(Clone)]
pub struct QueueFrontDoor {
    store: Arc<dyn SharedStore>,
    layout: ArtifactLayout,
    upload_dir: PathBuf,
    config: QueueConfig,
}

impl QueueFrontDoor {
    pub fn new(
        store: Arc<dyn SharedStore>,
        layout: ArtifactLayout,
        upload_dir: PathBuf,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            layout,
            upload_dir,
            config,
        }
    }

    /// Persists an upload and queues it
    ///
    /// The payload and record are written first and the ID is pushed with a
    /// capped push, so a worker never pops an ID whose payload is missing.
    /// When the push is refused both are removed again.
    pub async fn submit(&self, upload: Upload) -> Result<QueuedJob, QueueError> {
        let max = self.config.max_queue_size;
        let waiting = self.store.llen(QUEUE_KEY).await?;
        if waiting >= max {
            warn!("Queue full ({} waiting), rejecting submission", waiting);
            return Err(QueueError::QueueFull);
        }

        let (toolchain, payload) = validate(upload)?;
        let id = JobId::generate();

        let payload_path = self
            .upload_dir
            .join(format!("{}.{}", id, payload.extension()));
        let (main_file, bytes) = match payload {
            JobPayload::SingleFile { base_name, content } => (base_name, content),
            JobPayload::Archive { data, main_file } => (main_file.unwrap_or_default(), data),
        };
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(QueueError::SavePayload)?;
        if let Err(e) = tokio::fs::write(&payload_path, &bytes).await {
            self.roll_back(&id, &payload_path).await;
            return Err(QueueError::SavePayload(e));
        }

        let record = JobRecord {
            id: id.clone(),
            status: JobStatus::Queued,
            toolchain,
            main_file: Some(main_file).filter(|m| !m.is_empty()),
            payload_path: Some(payload_path.to_string_lossy().into_owned()),
            error: None,
            logs_url: None,
            pdf_url: None,
            created: chrono::Utc::now(),
        };
        let pushed = match set_json(
            self.store.as_ref(),
            &record_key(&id),
            &record,
            Some(self.config.status_retention),
        )
        .await
        {
            Ok(()) => self.store.lpush_capped(QUEUE_KEY, id.to_string(), max).await,
            Err(e) => Err(e),
        };

        match pushed {
            Ok(Some(_)) => {
                info!("[{}] Queued ({}, {} bytes)", id, toolchain, bytes.len());
                Ok(QueuedJob::accepted(id))
            }
            Ok(None) => {
                warn!("Queue full ({} waiting), rejecting submission", max);
                self.roll_back(&id, &payload_path).await;
                Err(QueueError::QueueFull)
            }
            Err(e) => {
                self.roll_back(&id, &payload_path).await;
                Err(e.into())
            }
        }
    }

    /// Removes what a refused submission left behind
    async fn roll_back(&self, id: &JobId, payload_path: &Path) {
        match tokio::fs::remove_file(payload_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("[{}] Failed to remove {}: {}", id, payload_path.display(), e),
        }
        if let Err(e) = self.store.del(&record_key(id)).await {
            warn!("[{}] Failed to remove record: {}", id, e);
        }
    }

    /// Current record of a job, without its internal payload path
    pub async fn status(&self, raw_id: &str) -> Result<JobRecord, QueueError> {
        let id = JobId::parse(raw_id).ok_or(QueueError::NotFound)?;
        let mut record: JobRecord = get_json(self.store.as_ref(), &record_key(&id))
            .await?
            .ok_or(QueueError::NotFound)?;
        record.payload_path = None;
        Ok(record)
    }

    /// Path of a completed job's PDF
    pub async fn artifact(&self, raw_id: &str) -> Result<PathBuf, QueueError> {
        let record = self.status(raw_id).await.map_err(|e| match e {
            QueueError::NotFound => QueueError::ArtifactNotFound,
            other => other,
        })?;
        if record.status != JobStatus::Completed {
            return Err(QueueError::ArtifactNotFound);
        }

        let path = self.layout.pdf_path(&record.id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(QueueError::ArtifactNotFound);
        }
        Ok(path)
    }
}
