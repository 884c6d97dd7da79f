//! Per-job compile log
//!
//! A plain-text file under the output area, one timestamped line per event.
//! Every line is synced to disk before the next stage starts, so a job killed
//! at its deadline still leaves a readable partial log.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Append-only compile log of one job
pub struct JobLog {
    path: PathBuf,
    file: Option<File>,
}

impl JobLog {
    /// Creates (or truncates) the log at `path`
    ///
    /// A log that cannot be created is not fatal to the job; lines are then
    /// only traced.
    pub async fn create(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match File::create(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Failed to create compile log {}: {}", path.display(), e);
                None
            }
        };
        Self { path, file }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the log file exists on disk
    pub fn is_written(&self) -> bool {
        self.file.is_some()
    }

    /// Appends one `[YYYY-MM-DD HH:MM:SS] message` line and syncs it
    pub async fn line(&mut self, message: impl AsRef<str>) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] {}\n", timestamp, message.as_ref());

        let result = async {
            file.write_all(line.as_bytes()).await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write compile log {}: {}", self.path.display(), e);
        }
    }

    /// Appends a subprocess's combined output under a heading line
    pub async fn output(&mut self, heading: impl AsRef<str>, output: &str) {
        let trimmed = output.trim_end();
        if trimmed.is_empty() {
            self.line(heading).await;
        } else {
            self.line(format!("{}:\n{}", heading.as_ref(), trimmed)).await;
        }
    }
}
