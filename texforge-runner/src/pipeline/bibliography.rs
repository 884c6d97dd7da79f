//! Bibliography step
//!
//! Runs between the first and second toolchain pass. A `.bcf` control file
//! selects biber; otherwise a `\bibdata` marker in the `.aux` file selects
//! bibtex. Neither tool's failure stops the build: a broken bibliography
//! should not block a document that only needs cross-references.

use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, warn};

use super::PipelineError;
use crate::config::{BIBER_BINARY, BIBTEX_BINARY, RunnerConfig};
use crate::deadline::Deadline;
use crate::log::JobLog;
use crate::process::{CommandError, run_command};

/// Marker the toolchain writes into the `.aux` file when bibtex is needed
const BIBDATA_MARKER: &str = "\\bibdata";

/// Bibliography tool selected for a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BibliographyTool {
    Biber,
    Bibtex,
}

impl BibliographyTool {
    pub fn binary(&self) -> &'static str {
        match self {
            BibliographyTool::Biber => BIBER_BINARY,
            BibliographyTool::Bibtex => BIBTEX_BINARY,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BibliographyTool::Biber => "Biber",
            BibliographyTool::Bibtex => "BibTeX",
        }
    }
}

/// Picks the tool the first pass asked for, if any
pub async fn detect(work: &Path, base: &str) -> Option<BibliographyTool> {
    if tokio::fs::try_exists(work.join(format!("{}.bcf", base)))
        .await
        .unwrap_or(false)
    {
        return Some(BibliographyTool::Biber);
    }

    // An unreadable .aux is treated like a missing one
    let aux = tokio::fs::read(work.join(format!("{}.aux", base))).await.ok()?;
    String::from_utf8_lossy(&aux)
        .contains(BIBDATA_MARKER)
        .then_some(BibliographyTool::Bibtex)
}

/// Detects and runs the bibliography tool
///
/// Only the job's deadline is fatal here.
pub async fn resolve(
    config: &RunnerConfig,
    work: &Path,
    base: &str,
    deadline: &Deadline,
    log: &mut JobLog,
) -> Result<(), PipelineError> {
    let Some(tool) = detect(work, base).await else {
        debug!("No bibliography requested for {}", base);
        return Ok(());
    };

    log.line(format!("Running {} for bibliography", tool.label()))
        .await;

    let program = config.binary(tool.binary());
    match run_command(work, &program, &[OsString::from(base)], deadline).await {
        Ok(output) => {
            log.output(format!("{} output", tool.label()), &output.output)
                .await;
            if !output.success() {
                warn!("{} exited with {}", tool.binary(), output.status);
                log.line(format!(
                    "{} failed (non-fatal): {}",
                    tool.label(),
                    output.status
                ))
                .await;
            }
            Ok(())
        }
        Err(CommandError::TimedOut { .. }) => {
            log.line(format!("{} timed out", tool.label())).await;
            Err(PipelineError::Timeout)
        }
        Err(e) => {
            warn!("{} could not run: {}", tool.binary(), e);
            log.line(format!("{} failed (non-fatal): {}", tool.label(), e))
                .await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bcf_selects_biber() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.bcf"), "").unwrap();
        std::fs::write(dir.path().join("main.aux"), "\\bibdata{refs}").unwrap();

        assert_eq!(
            detect(dir.path(), "main").await,
            Some(BibliographyTool::Biber)
        );
    }

    #[tokio::test]
    async fn test_bibdata_marker_selects_bibtex() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.aux"),
            "\\relax\n\\bibstyle{plain}\n\\bibdata{refs}\n",
        )
        .unwrap();

        assert_eq!(
            detect(dir.path(), "main").await,
            Some(BibliographyTool::Bibtex)
        );
    }

    #[tokio::test]
    async fn test_no_bibliography() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect(dir.path(), "main").await, None);

        std::fs::write(dir.path().join("main.aux"), "\\relax\n\\newlabel{x}{1}\n").unwrap();
        assert_eq!(detect(dir.path(), "main").await, None);
    }
}
