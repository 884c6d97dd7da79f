//! Runner configuration
//!
//! Defines where the toolchain binaries live and the resource caps applied
//! while staging a job's sources.

use std::ffi::OsString;
use std::path::PathBuf;

/// Binary resolving references recorded in a `.bcf` control file
pub const BIBER_BINARY: &str = "biber";

/// Legacy binary resolving `\bibdata` references from the `.aux` file
pub const BIBTEX_BINARY: &str = "bibtex";

/// Archive limits
///
/// Exceeding either cap aborts the extraction; nothing is truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Maximum number of entries (files and directories) in one archive
    pub max_entries: usize,

    /// Maximum decompressed size of a single file, in bytes
    pub max_entry_size: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 50,
            max_entry_size: 5 * 1024 * 1024,
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Directory holding the toolchain and bibliography binaries.
    /// `None` resolves them through `PATH`.
    pub toolchain_dir: Option<PathBuf>,

    /// Caps applied by the archive extractor
    pub archive_limits: ArchiveLimits,
}

impl RunnerConfig {
    pub fn new(toolchain_dir: Option<PathBuf>, archive_limits: ArchiveLimits) -> Self {
        Self {
            toolchain_dir,
            archive_limits,
        }
    }

    /// Resolves the program to spawn for a binary name
    pub fn binary(&self, name: &str) -> OsString {
        match &self.toolchain_dir {
            Some(dir) => dir.join(name).into_os_string(),
            None => OsString::from(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ArchiveLimits::default();
        assert_eq!(limits.max_entries, 50);
        assert_eq!(limits.max_entry_size, 5 * 1024 * 1024);
    }

    #[test]
    fn test_binary_resolution() {
        let config = RunnerConfig::default();
        assert_eq!(config.binary("pdflatex"), OsString::from("pdflatex"));

        let config = RunnerConfig::new(Some(PathBuf::from("/opt/tex/bin")), ArchiveLimits::default());
        assert_eq!(
            config.binary("biber"),
            PathBuf::from("/opt/tex/bin/biber").into_os_string()
        );
    }
}
