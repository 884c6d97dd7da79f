//! Deferred cleanup

use std::collections::HashMap;
use std::io;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use texforge_core::domain::job::JobId;
use texforge_runner::ArtifactLayout;

/// Schedules one-shot deletion of artifact sets
///
/// Pending deletions are abandoned when `shutdown` fires;
/// [`CleanupScheduler::reclaim`] takes them over on the next start.
#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    layout: ArtifactLayout,
    delay: Duration,
    shutdown: CancellationToken,
}

impl CleanupScheduler {
    pub fn new(layout: ArtifactLayout, delay: Duration, shutdown: CancellationToken) -> Self {
        Self {
            layout,
            delay,
            shutdown,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Deletes the job's log and PDF once the grace period has passed
    ///
    /// Aborting the returned handle cancels the deletion.
    pub fn schedule(&self, id: JobId) -> JoinHandle<()> {
        self.schedule_after(id, self.delay)
    }

    fn schedule_after(&self, id: JobId, delay: Duration) -> JoinHandle<()> {
        let layout = self.layout.clone();
        let shutdown = self.shutdown.clone();

        debug!("[{}] Cleanup scheduled in {:?}", id, delay);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    debug!("[{}] Cleanup abandoned at shutdown", id);
                    return;
                }
            }

            match layout.remove_artifacts(&id).await {
                Ok(()) => info!("[{}] Cleaned up artifacts", id),
                Err(e) => warn!("[{}] Failed to clean up artifacts: {}", id, e),
            }
        })
    }

    /// Takes over the artifact sets a previous run left in the output area
    ///
    /// A set is as old as its youngest file. Sets older than `retention` are
    /// deleted at once; younger ones are scheduled for the rest of their
    /// grace period.
    pub async fn reclaim(&self, retention: Duration) -> io::Result<Reclaimed> {
        let now = SystemTime::now();
        let mut ages: HashMap<JobId, Duration> = HashMap::new();

        for dir in [self.layout.logs_dir(), self.layout.files_dir()] {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let Some(id) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(JobId::parse)
                else {
                    continue;
                };
                let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                    continue;
                };
                let age = now.duration_since(modified).unwrap_or_default();
                ages.entry(id)
                    .and_modify(|oldest| *oldest = (*oldest).min(age))
                    .or_insert(age);
            }
        }

        let mut reclaimed = Reclaimed::default();
        for (id, age) in ages {
            match retention.checked_sub(age).filter(|rest| !rest.is_zero()) {
                Some(rest) => reclaimed.scheduled.push(self.schedule_after(id, rest)),
                None => match self.layout.remove_artifacts(&id).await {
                    Ok(()) => reclaimed.removed += 1,
                    Err(e) => warn!("[{}] Failed to clean up artifacts: {}", id, e),
                },
            }
        }

        info!(
            "Reclaimed output area: {} stale artifact sets removed, {} rescheduled",
            reclaimed.removed,
            reclaimed.scheduled.len()
        );
        Ok(reclaimed)
    }
}

/// What [`CleanupScheduler::reclaim`] found
#[derive(Debug, Default)]
pub struct Reclaimed {
    /// Sets deleted at once
    pub removed: usize,
    /// Deletions still waiting out their grace period
    pub scheduled: Vec<JoinHandle<()>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, ArtifactLayout, JobId) {
        let root = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(root.path().join("work"), root.path().join("out"));
        layout.ensure_dirs().unwrap();
        let id = JobId::generate();
        std::fs::write(layout.pdf_path(&id), b"%PDF").unwrap();
        std::fs::write(layout.log_path(&id), b"log").unwrap();
        (root, layout, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletes_after_grace_period() {
        let (_root, layout, id) = fixture();
        let scheduler =
            CleanupScheduler::new(layout.clone(), Duration::from_secs(60), CancellationToken::new());

        let handle = scheduler.schedule(id.clone());

        tokio::time::advance(Duration::from_secs(59)).await;
        tokio::task::yield_now().await;
        assert!(layout.pdf_path(&id).exists());

        handle.await.unwrap();
        assert!(!layout.pdf_path(&id).exists());
        assert!(!layout.log_path(&id).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_cleanup_is_not_an_error() {
        let (_root, layout, id) = fixture();
        let scheduler =
            CleanupScheduler::new(layout.clone(), Duration::from_secs(1), CancellationToken::new());

        let first = scheduler.schedule(id.clone());
        let second = scheduler.schedule(id.clone());

        first.await.unwrap();
        second.await.unwrap();
        assert!(!layout.log_path(&id).exists());
    }

    fn age(path: &std::path::Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_takes_over_leftover_artifacts() {
        let (_root, layout, stale) = fixture();
        age(&layout.pdf_path(&stale), Duration::from_secs(3600));
        age(&layout.log_path(&stale), Duration::from_secs(3600));
        let fresh = JobId::generate();
        std::fs::write(layout.log_path(&fresh), b"log").unwrap();
        std::fs::write(layout.files_dir().join("notes.txt"), b"kept").unwrap();
        let scheduler =
            CleanupScheduler::new(layout.clone(), Duration::from_secs(60), CancellationToken::new());

        let reclaimed = scheduler.reclaim(Duration::from_secs(60)).await.unwrap();

        assert_eq!(reclaimed.removed, 1);
        assert!(!layout.pdf_path(&stale).exists());
        assert!(!layout.log_path(&stale).exists());
        assert!(layout.log_path(&fresh).exists());
        assert_eq!(reclaimed.scheduled.len(), 1);

        for handle in reclaimed.scheduled {
            handle.await.unwrap();
        }
        assert!(!layout.log_path(&fresh).exists());
        assert!(layout.files_dir().join("notes.txt").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_pending_cleanup() {
        let (_root, layout, id) = fixture();
        let shutdown = CancellationToken::new();
        let scheduler = CleanupScheduler::new(layout.clone(), Duration::from_secs(60), shutdown.clone());

        let handle = scheduler.schedule(id.clone());
        shutdown.cancel();

        handle.await.unwrap();
        assert!(layout.pdf_path(&id).exists());
    }
}
