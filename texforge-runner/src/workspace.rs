//! Working directories and the artifact layout
//!
//! A [`WorkDir`] is a job's exclusive scratch directory; dropping the guard
//! removes it recursively on every exit path, panics included.
//!
//! [`ArtifactLayout`] names the places a job reads from and publishes to:
//! the root its working directories are created under, plus the `logs/` and
//! `files/` halves of the shared output area.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::extract::resolve_inside;
use texforge_core::domain::artifact;
use texforge_core::domain::job::JobId;

/// Scoped per-job scratch directory
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Creates `<root>/<id>`, failing if it already exists
    pub fn create(root: &Path, id: &JobId) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let path = root.join(id.as_str());
        std::fs::create_dir(&path)?;
        debug!("Created working directory {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed working directory {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove working directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Where jobs work and publish
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    work_root: PathBuf,
    logs_dir: PathBuf,
    files_dir: PathBuf,
}

impl ArtifactLayout {
    /// Lays out `logs/` and `files/` under `output_root`
    pub fn new(work_root: impl Into<PathBuf>, output_root: impl AsRef<Path>) -> Self {
        let output_root = output_root.as_ref();
        Self {
            work_root: work_root.into(),
            logs_dir: output_root.join("logs"),
            files_dir: output_root.join("files"),
        }
    }

    /// Creates every directory of the layout
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.work_root)?;
        std::fs::create_dir_all(&self.logs_dir)?;
        std::fs::create_dir_all(&self.files_dir)
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn log_path(&self, id: &JobId) -> PathBuf {
        self.logs_dir.join(artifact::log_file_name(id))
    }

    pub fn pdf_path(&self, id: &JobId) -> PathBuf {
        self.files_dir.join(artifact::artifact_file_name(id))
    }

    /// Resolves a requested log name, `None` unless it is one plain file
    /// name inside the logs directory
    pub fn resolve_log(&self, name: &str) -> Option<PathBuf> {
        resolve_single(&self.logs_dir, name)
    }

    /// Resolves a requested PDF name, `None` unless it is one plain file
    /// name inside the files directory
    pub fn resolve_pdf(&self, name: &str) -> Option<PathBuf> {
        resolve_single(&self.files_dir, name)
    }

    /// Deletes a job's log and PDF; files already gone are not an error
    pub async fn remove_artifacts(&self, id: &JobId) -> io::Result<()> {
        remove_if_present(&self.pdf_path(id)).await?;
        remove_if_present(&self.log_path(id)).await
    }
}

fn resolve_single(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return None;
    }
    let path = resolve_inside(dir, name)?;
    (path.parent() == Some(dir)).then_some(path)
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
