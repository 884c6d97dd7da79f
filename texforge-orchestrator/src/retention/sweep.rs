//! Sweep over expiring shadow keys
//!
//! Each queued job that published artifacts leaves a `pdf:<id>` key with a
//! fixed time-to-live. Every interval the sweeper lists those keys and, for
//! each one whose time-to-live has run out, deletes the job's PDF and log
//! and then the key. Expiry lives in the store, not in this process, so a
//! restart loses nothing; the cost is up to one interval of staleness.
//!
//! Expired job records (`req:<id>`) are removed in the same pass together
//! with any payload a worker never picked up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::store::{ARTIFACT_PREFIX, RECORD_PREFIX, SharedStore, StoreError};
use crate::queue::upload_paths;
use texforge_core::domain::job::JobId;
use texforge_runner::ArtifactLayout;

/// What one sweep removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub artifacts: usize,
    pub records: usize,
}

/// Periodic sweeper
pub struct Sweeper {
    store: Arc<dyn SharedStore>,
    layout: ArtifactLayout,
    upload_dir: PathBuf,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn SharedStore>,
        layout: ArtifactLayout,
        upload_dir: PathBuf,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            layout,
            upload_dir,
            interval,
        }
    }

    /// Sweeps every interval until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Sweeper started, interval {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.sweep_once().await {
                Ok(report) if report != SweepReport::default() => info!(
                    "Sweep removed {} artifact sets and {} job records",
                    report.artifacts, report.records
                ),
                Ok(_) => debug!("Sweep found nothing to remove"),
                Err(e) => error!("Sweep failed: {}", e),
            }
        }

        info!("Sweeper stopped");
    }

    /// Runs one pass
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        for key in self.expired(ARTIFACT_PREFIX).await? {
            let Some(id) = key.strip_prefix(ARTIFACT_PREFIX).and_then(JobId::parse) else {
                warn!("Dropping malformed shadow key {}", key);
                self.store.del(&key).await?;
                continue;
            };

            // The key outlives a failed deletion so the next pass retries
            if let Err(e) = self.layout.remove_artifacts(&id).await {
                warn!("[{}] Failed to delete artifacts: {}", id, e);
                continue;
            }
            self.store.del(&key).await?;
            debug!("[{}] Swept artifacts", id);
            report.artifacts += 1;
        }

        for key in self.expired(RECORD_PREFIX).await? {
            if let Some(id) = key.strip_prefix(RECORD_PREFIX).and_then(JobId::parse) {
                for path in upload_paths(&self.upload_dir, &id) {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!("Failed to delete {}: {}", path.display(), e);
                        }
                    }
                }
            }
            self.store.del(&key).await?;
            report.records += 1;
        }

        Ok(report)
    }

    /// Keys under `prefix` whose time-to-live has run out
    async fn expired(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut expired = Vec::new();
        for key in self.store.keys(prefix).await? {
            if self.store.ttl(&key).await? == Some(Duration::ZERO) {
                expired.push(key);
            }
        }
        Ok(expired)
    }
}
