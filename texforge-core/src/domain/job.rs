//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Extension of a document source file
pub const SOURCE_EXTENSION: &str = "tex";

/// Extension of an uploaded source archive
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Alphabet job identifiers are drawn from
pub const JOB_ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Length of a job identifier
pub const JOB_ID_LEN: usize = 12;

/// Opaque job identifier
///
/// Twelve characters of lowercase alphanumerics. No uniqueness check is
/// performed; 36^12 identifiers make collisions negligible at expected load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a new random identifier
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(JOB_ID_LEN, &JOB_ID_ALPHABET))
    }

    /// Parses an identifier received from outside, rejecting anything that
    /// could not have been generated by [`JobId::generate`]
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == JOB_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase());
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document toolchain a job is compiled with
///
/// The variant name doubles as the binary invoked for each pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolchain {
    #[default]
    Pdflatex,
    Lualatex,
    Xelatex,
}

impl Toolchain {
    pub const ALL: [Toolchain; 3] = [Toolchain::Pdflatex, Toolchain::Lualatex, Toolchain::Xelatex];

    /// Binary name of the toolchain
    pub fn as_str(&self) -> &'static str {
        match self {
            Toolchain::Pdflatex => "pdflatex",
            Toolchain::Lualatex => "lualatex",
            Toolchain::Xelatex => "xelatex",
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a toolchain name is not one of the supported set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownToolchain(pub String);

impl fmt::Display for UnknownToolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid compiler '{}'. Use: pdflatex, lualatex, or xelatex",
            self.0
        )
    }
}

impl std::error::Error for UnknownToolchain {}

impl FromStr for Toolchain {
    type Err = UnknownToolchain;

    /// Exact, case-sensitive match; the empty string is rejected
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Toolchain::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownToolchain(s.to_string()))
    }
}

/// Job lifecycle status
///
/// `Queued -> Processing -> {Completed | Failed | TimedOut}`. Terminal states
/// are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Input of a job
///
/// A job is in exactly one of these shapes for its whole lifetime.
#[derive(Debug, Clone)]
pub enum JobPayload {
    /// A single source file, written verbatim as `<base_name>.tex`
    SingleFile { base_name: String, content: Vec<u8> },

    /// An archive of files plus the path of the main source inside it.
    /// `None` means the archive must contain exactly one source file.
    Archive {
        data: Vec<u8>,
        main_file: Option<String>,
    },
}

impl JobPayload {
    /// Main file as declared by the caller, for logging
    pub fn main_file_label(&self) -> &str {
        match self {
            JobPayload::SingleFile { base_name, .. } => base_name,
            JobPayload::Archive {
                main_file: Some(main),
                ..
            } => main,
            JobPayload::Archive {
                main_file: None, ..
            } => "<auto>",
        }
    }

    /// Extension a stored copy of the payload is given
    pub fn extension(&self) -> &'static str {
        match self {
            JobPayload::SingleFile { .. } => SOURCE_EXTENSION,
            JobPayload::Archive { .. } => ARCHIVE_EXTENSION,
        }
    }
}

/// A unit of compilation work
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub id: JobId,
    pub toolchain: Toolchain,
    pub payload: JobPayload,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl CompileJob {
    pub fn new(toolchain: Toolchain, payload: JobPayload) -> Self {
        Self::with_id(JobId::generate(), toolchain, payload)
    }

    pub fn with_id(id: JobId, toolchain: Toolchain, payload: JobPayload) -> Self {
        Self {
            id,
            toolchain,
            payload,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Persisted job record used by the queue front door
///
/// Lives in the shared store under a time-to-live; callers poll it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub toolchain: Toolchain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,
    /// Where the uploaded payload waits for a worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub created: chrono::DateTime<chrono::Utc>,
}
