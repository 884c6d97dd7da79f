//! Queue worker
//!
//! A single consumer: pops one job ID at a time, compiles it through the
//! same compile service as the synchronous endpoint, and writes the terminal
//! record back. Throughput is traded for simplicity; the queue length is the
//! only admission control in this mode.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::store::{QUEUE_KEY, SharedStore, StoreError, artifact_key, get_json, record_key, set_json};
use super::upload_paths;
use crate::config::QueueConfig;
use crate::dispatcher::execute;
use texforge_core::domain::job::{
    ARCHIVE_EXTENSION, CompileJob, JobId, JobPayload, JobRecord, JobStatus,
};
use texforge_core::domain::result::JobOutcome;
use texforge_runner::CompileService;

/// How long one blocking pop waits before re-checking for shutdown
const POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Back-off after the store fails
const STORE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Single-consumer worker
pub struct QueueWorker {
    store: Arc<dyn SharedStore>,
    service: Arc<dyn CompileService>,
    upload_dir: PathBuf,
    config: QueueConfig,
}

impl QueueWorker {
    pub fn new(
        store: Arc<dyn SharedStore>,
        service: Arc<dyn CompileService>,
        upload_dir: PathBuf,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            service,
            upload_dir,
            config,
        }
    }

    /// Pops and processes jobs until `shutdown` fires
    ///
    /// A job already being compiled is finished before the loop exits.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Queue worker started");

        loop {
            let popped = tokio::select! {
                _ = shutdown.cancelled() => break,
                popped = self.store.brpop(QUEUE_KEY, POP_TIMEOUT) => popped,
            };

            match popped {
                Ok(Some(raw_id)) => {
                    if let Err(e) = self.process(&raw_id).await {
                        error!("Failed to process queued job {}: {}", raw_id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to pop from queue: {}", e);
                    tokio::time::sleep(STORE_RETRY_DELAY).await;
                }
            }
        }

        info!("Queue worker stopped");
    }

    /// Processes one popped ID, returning the outcome of the compiled job
    ///
    /// Records that expired while waiting are skipped.
    pub async fn process(&self, raw_id: &str) -> Result<Option<JobOutcome>, StoreError> {
        let Some(id) = JobId::parse(raw_id) else {
            warn!("Skipping malformed queue entry {:?}", raw_id);
            return Ok(None);
        };

        let key = record_key(&id);
        let Some(mut record) = get_json::<JobRecord>(self.store.as_ref(), &key).await? else {
            info!("[{}] Record expired before processing, skipping", id);
            self.discard_payload(&id).await;
            return Ok(None);
        };

        record.status = JobStatus::Processing;
        self.save(&key, &record).await?;
        info!("[{}] Processing ({})", id, record.toolchain);

        let outcome = match self.load_payload(&record).await {
            Some(payload) => {
                let job = CompileJob::with_id(id.clone(), record.toolchain, payload);
                execute(self.service.clone(), job, self.config.job_timeout).await
            }
            None => JobOutcome::failed(id.clone(), "Uploaded file is missing", false),
        };
        self.discard_payload(&id).await;

        record.status = outcome.status;
        record.logs_url = outcome.result.logs_url.clone();
        record.pdf_url = outcome.result.pdf_url.clone();
        record.error = (!outcome.result.success)
            .then(|| outcome.result.message.clone())
            .flatten();
        self.save(&key, &record).await?;

        if outcome.result.has_artifacts() {
            self.store
                .set(
                    &artifact_key(&id),
                    id.to_string(),
                    Some(self.config.artifact_retention),
                )
                .await?;
        }

        info!("[{}] Finished: {}", id, outcome.status);
        Ok(Some(outcome))
    }

    async fn save(&self, key: &str, record: &JobRecord) -> Result<(), StoreError> {
        set_json(
            self.store.as_ref(),
            key,
            record,
            Some(self.config.status_retention),
        )
        .await
    }

    async fn load_payload(&self, record: &JobRecord) -> Option<JobPayload> {
        let path = PathBuf::from(record.payload_path.as_deref()?);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("[{}] Failed to read {}: {}", record.id, path.display(), e);
                return None;
            }
        };

        let main_file = record.main_file.clone();
        if is_archive(&path) {
            Some(JobPayload::Archive {
                data: bytes,
                main_file,
            })
        } else {
            Some(JobPayload::SingleFile {
                base_name: main_file?,
                content: bytes,
            })
        }
    }

    async fn discard_payload(&self, id: &JobId) {
        for path in upload_paths(&self.upload_dir, id) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("[{}] Removed {}", id, path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("[{}] Failed to remove {}: {}", id, path.display(), e),
            }
        }
    }
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}
