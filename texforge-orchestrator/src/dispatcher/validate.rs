//! Upload validation
//!
//! Everything here runs before admission and touches no disk: a rejected
//! upload creates no job and leaves no trace.

use thiserror::Error;

use texforge_core::domain::job::{
    ARCHIVE_EXTENSION, JobPayload, SOURCE_EXTENSION, Toolchain, UnknownToolchain,
};
use texforge_runner::extract::source_entries;

/// A raw upload as received by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// File name declared by the client
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Main file inside an archive; ignored for single files
    pub main: Option<String>,
    /// Toolchain name; only `None` selects the default, an empty name is rejected
    pub compiler: Option<String>,
}

/// Errors raised while validating an upload
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No file uploaded")]
    NoFile,

    #[error("Only ZIP and .tex files are allowed")]
    UnsupportedType,

    #[error("Invalid file name")]
    InvalidFileName,

    #[error(transparent)]
    UnknownToolchain(#[from] UnknownToolchain),

    #[error("Failed to read zip file")]
    MalformedArchive,

    #[error("main parameter is required for ZIP files with multiple .tex files")]
    MainFileRequired,
}

/// Turns an upload into a toolchain and a job payload
pub fn validate(upload: Upload) -> Result<(Toolchain, JobPayload), ValidationError> {
    let Upload {
        file_name,
        bytes,
        main,
        compiler,
    } = upload;

    if bytes.is_empty() {
        return Err(ValidationError::NoFile);
    }

    let toolchain = match compiler {
        Some(name) => name.parse::<Toolchain>()?,
        None => Toolchain::default(),
    };

    // Only the last path component of a client-supplied name is kept
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if strip_extension(name, ARCHIVE_EXTENSION).is_some() {
        let main_file = match main.filter(|m| !m.trim().is_empty()) {
            Some(main) => main,
            None => infer_main(&bytes)?,
        };
        return Ok((
            toolchain,
            JobPayload::Archive {
                data: bytes,
                main_file: Some(main_file),
            },
        ));
    }

    if let Some(stem) = strip_extension(name, SOURCE_EXTENSION) {
        if stem.is_empty() || stem.starts_with('.') {
            return Err(ValidationError::InvalidFileName);
        }
        return Ok((
            toolchain,
            JobPayload::SingleFile {
                base_name: stem.to_string(),
                content: bytes,
            },
        ));
    }

    Err(ValidationError::UnsupportedType)
}

/// Picks the only source file of an archive
fn infer_main(data: &[u8]) -> Result<String, ValidationError> {
    let mut entries = source_entries(data).map_err(|_| ValidationError::MalformedArchive)?;
    if entries.len() != 1 {
        return Err(ValidationError::MainFileRequired);
    }
    Ok(entries.remove(0))
}

/// Strips `.ext` (any case) from `name`
fn strip_extension<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(ext.len() + 1)?;
    let (stem, suffix) = (name.get(..split)?, name.get(split..)?);
    (suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(ext)).then_some(stem)
}
