//! Staging and publishing
//!
//! Staging turns a job payload into files inside the working directory and
//! resolves the main source file. Publishing copies the rendered output into
//! the shared output area.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::PipelineError;
use crate::config::ArchiveLimits;
use crate::extract::{extract_archive, resolve_inside, source_entries};
use crate::log::JobLog;
use texforge_core::domain::job::{JobPayload, SOURCE_EXTENSION};

/// Main source file of a staged job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainFile {
    /// Path relative to the working directory, as handed to the toolchain
    pub relative: String,
    /// File name without the source extension; names every output file
    pub base: String,
}

impl MainFile {
    fn new(relative: String) -> Self {
        let file_name = Path::new(&relative)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.clone());
        let base = strip_source_extension(&file_name).to_string();
        Self { relative, base }
    }

    /// Rendered output the toolchain writes into the working directory
    pub fn pdf_name(&self) -> String {
        format!("{}.pdf", self.base)
    }
}

fn strip_source_extension(name: &str) -> &str {
    name.strip_suffix(&format!(".{}", SOURCE_EXTENSION))
        .unwrap_or(name)
}

/// Materializes `payload` into `work` and resolves the main file
pub async fn prepare(
    work: &Path,
    payload: JobPayload,
    limits: &ArchiveLimits,
    log: &mut JobLog,
) -> Result<MainFile, PipelineError> {
    match payload {
        JobPayload::SingleFile { base_name, content } => {
            log.line("Processing single .tex file").await;
            let relative = format!("{}.{}", base_name, SOURCE_EXTENSION);
            let path = single_component(work, &relative).ok_or_else(|| {
                PipelineError::WriteSource(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid source name {:?}", base_name),
                ))
            })?;

            if let Err(e) = tokio::fs::write(&path, &content).await {
                log.line(format!("Failed to write .tex file: {}", e)).await;
                return Err(PipelineError::WriteSource(e));
            }
            Ok(MainFile::new(relative))
        }
        JobPayload::Archive { data, main_file } => {
            log.line("Extracting ZIP file").await;

            let main = match main_file {
                Some(main) => main,
                None => infer_main(&data, log).await?,
            };

            let dest = work.to_path_buf();
            let limits = *limits;
            let extracted =
                tokio::task::spawn_blocking(move || extract_archive(&data, &dest, &limits))
                    .await
                    .map_err(|e| PipelineError::Internal(e.to_string()))?;

            match extracted {
                Ok(count) => {
                    debug!("Extracted {} files into {}", count, work.display());
                    log.line(format!("Extracted {} files", count)).await;
                }
                Err(e) => {
                    log.line(format!("Failed to extract ZIP: {}", e)).await;
                    return Err(PipelineError::Extract(e));
                }
            }

            resolve_main(work, &main, log).await
        }
    }
}

/// Picks the only source file of an archive
async fn infer_main(data: &[u8], log: &mut JobLog) -> Result<String, PipelineError> {
    let entries = match source_entries(data) {
        Ok(entries) => entries,
        Err(e) => {
            log.line(format!("Failed to extract ZIP: {}", e)).await;
            return Err(PipelineError::Extract(e));
        }
    };

    match entries.as_slice() {
        [only] => {
            log.line(format!("Using {} as main file", only)).await;
            Ok(only.clone())
        }
        _ => {
            log.line(format!(
                "Cannot pick a main file among {} source files",
                entries.len()
            ))
            .await;
            Err(PipelineError::AmbiguousMainFile)
        }
    }
}

/// Requires the declared main file to exist inside `work`
///
/// The source extension is appended when missing.
async fn resolve_main(work: &Path, main: &str, log: &mut JobLog) -> Result<MainFile, PipelineError> {
    let relative = if main.ends_with(&format!(".{}", SOURCE_EXTENSION)) {
        main.to_string()
    } else {
        format!("{}.{}", main, SOURCE_EXTENSION)
    };

    let exists = match resolve_inside(work, &relative) {
        Some(path) => tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false),
        None => false,
    };

    if !exists {
        log.line(format!("Main file not found: {}", main)).await;
        return Err(PipelineError::MainFileNotFound(main.to_string()));
    }

    Ok(MainFile::new(relative))
}

/// Resolves a name that must be a direct child of `dir`
fn single_component(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = resolve_inside(dir, name)?;
    (path.parent() == Some(dir)).then_some(path)
}

/// Copies the rendered output to `dest`
///
/// A copy rather than a move, so the working directory's removal never races
/// the publish.
pub async fn publish(pdf: &Path, dest: &Path, log: &mut JobLog) -> Result<(), PipelineError> {
    let result = async {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(pdf, dest).await
    }
    .await;

    match result {
        Ok(bytes) => {
            info!("Published {} ({} bytes)", dest.display(), bytes);
            Ok(())
        }
        Err(e) => {
            log.line(format!("Failed to copy PDF: {}", e)).await;
            Err(PipelineError::Publish(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::archive;

    async fn scratch_log(dir: &Path) -> JobLog {
        JobLog::create(dir.join("job.log")).await
    }

    #[test]
    fn test_main_file_base() {
        let main = MainFile::new("chapters/thesis.tex".to_string());
        assert_eq!(main.base, "thesis");
        assert_eq!(main.pdf_name(), "thesis.pdf");
    }

    #[tokio::test]
    async fn test_single_file_is_written_verbatim() {
        let work = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let mut log = scratch_log(logs.path()).await;

        let payload = JobPayload::SingleFile {
            base_name: "paper".to_string(),
            content: b"\\documentclass{article}".to_vec(),
        };
        let main = prepare(work.path(), payload, &ArchiveLimits::default(), &mut log)
            .await
            .unwrap();

        assert_eq!(main.relative, "paper.tex");
        assert_eq!(
            std::fs::read(work.path().join("paper.tex")).unwrap(),
            b"\\documentclass{article}"
        );
    }

    #[tokio::test]
    async fn test_declared_main_gets_extension() {
        let work = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let mut log = scratch_log(logs.path()).await;

        let payload = JobPayload::Archive {
            data: archive(&[("src/thesis.tex", b"x".as_slice()), ("refs.bib", b"".as_slice())]),
            main_file: Some("src/thesis".to_string()),
        };
        let main = prepare(work.path(), payload, &ArchiveLimits::default(), &mut log)
            .await
            .unwrap();

        assert_eq!(main.relative, "src/thesis.tex");
        assert_eq!(main.base, "thesis");
    }

    #[tokio::test]
    async fn test_missing_main_file() {
        let work = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let mut log = scratch_log(logs.path()).await;

        let payload = JobPayload::Archive {
            data: archive(&[("main.tex", b"x".as_slice())]),
            main_file: Some("thesis.tex".to_string()),
        };
        let err = prepare(work.path(), payload, &ArchiveLimits::default(), &mut log)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Main file not found: thesis.tex");
    }

    #[tokio::test]
    async fn test_main_file_outside_work_dir_is_not_found() {
        let outer = tempfile::tempdir().unwrap();
        let work = outer.path().join("work");
        std::fs::create_dir(&work).unwrap();
        std::fs::write(outer.path().join("secret.tex"), "x").unwrap();
        let mut log = scratch_log(outer.path()).await;

        let payload = JobPayload::Archive {
            data: archive(&[("main.tex", b"x".as_slice())]),
            main_file: Some("../secret.tex".to_string()),
        };
        let err = prepare(&work, payload, &ArchiveLimits::default(), &mut log)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MainFileNotFound(_)));
    }

    #[tokio::test]
    async fn test_single_source_is_inferred() {
        let work = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let mut log = scratch_log(logs.path()).await;

        let payload = JobPayload::Archive {
            data: archive(&[("doc/report.tex", b"x".as_slice()), ("doc/fig.png", b"".as_slice())]),
            main_file: None,
        };
        let main = prepare(work.path(), payload, &ArchiveLimits::default(), &mut log)
            .await
            .unwrap();

        assert_eq!(main.relative, "doc/report.tex");
    }

    #[tokio::test]
    async fn test_ambiguous_main_is_rejected_before_extraction() {
        let work = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let mut log = scratch_log(logs.path()).await;

        let payload = JobPayload::Archive {
            data: archive(&[("a.tex", b"x".as_slice()), ("b.tex", b"y".as_slice())]),
            main_file: None,
        };
        let err = prepare(work.path(), payload, &ArchiveLimits::default(), &mut log)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::AmbiguousMainFile));
        assert!(!work.path().join("a.tex").exists());
    }

    #[tokio::test]
    async fn test_publish_copies() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = scratch_log(dir.path()).await;
        let pdf = dir.path().join("main.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();
        let dest = dir.path().join("files/abc.pdf");

        publish(&pdf, &dest, &mut log).await.unwrap();

        assert!(pdf.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4");
    }
}
