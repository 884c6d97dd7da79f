//! Orchestrator configuration
//!
//! Every setting is read once at start from the environment, falling back to
//! defaults. There is no hot reload.

use anyhow::{Context, bail};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use texforge_runner::{ArchiveLimits, ArtifactLayout, RunnerConfig};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address of the HTTP server
    pub bind_addr: String,

    /// Admission ceiling of the synchronous compile endpoint
    pub max_concurrent_jobs: usize,

    /// Per-job deadline of the synchronous compile endpoint
    pub compilation_timeout: Duration,

    /// Grace period before a published artifact set is deleted
    pub cleanup_delay: Duration,

    /// Root of per-job working directories
    pub work_dir: PathBuf,

    /// Root of the shared output area (`logs/` and `files/`)
    pub output_dir: PathBuf,

    /// Where queued payloads wait for the worker
    pub upload_dir: PathBuf,

    /// Directory holding the toolchain binaries; `PATH` when unset
    pub toolchain_dir: Option<PathBuf>,

    /// Request body cap in bytes
    pub max_upload_size: usize,

    pub archive_limits: ArchiveLimits,

    pub queue: QueueConfig,
}

/// Queue front door settings
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Mounts `/jobs`, the worker and the sweeper
    pub enabled: bool,

    /// Submissions are rejected once this many IDs are waiting
    pub max_queue_size: usize,

    /// Per-job deadline of queued jobs
    pub job_timeout: Duration,

    /// Time-to-live of job records
    pub status_retention: Duration,

    /// Time-to-live of the shadow key guarding a queued job's artifacts
    pub artifact_retention: Duration,

    /// Period of the artifact sweep
    pub sweep_interval: Duration,

    /// Redis URL of the shared store; the store lives in this process when unset
    pub store_url: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_queue_size: 10,
            job_timeout: Duration::from_secs(30),
            status_retention: Duration::from_secs(10 * 60),
            artifact_retention: Duration::from_secs(3 * 60),
            sweep_interval: Duration::from_secs(60),
            store_url: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_concurrent_jobs: 5,
            compilation_timeout: Duration::from_secs(15),
            cleanup_delay: Duration::from_secs(60),
            work_dir: PathBuf::from("/app/processing"),
            output_dir: PathBuf::from("/app/output"),
            upload_dir: PathBuf::from("/app/uploads"),
            toolchain_dir: None,
            max_upload_size: 32 * 1024 * 1024,
            archive_limits: ArchiveLimits::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - TEXFORGE_BIND_ADDR (default: 0.0.0.0:8080)
    /// - MAX_CONCURRENT_JOBS (default: 5)
    /// - COMPILATION_TIMEOUT (seconds, default: 15)
    /// - CLEANUP_DELAY (seconds, default: 60)
    /// - WORK_DIR, OUTPUT_DIR, UPLOAD_DIR, TOOLCHAIN_DIR
    /// - MAX_UPLOAD_SIZE (bytes, default: 32 MiB)
    /// - MAX_ARCHIVE_ENTRIES (default: 50), MAX_ENTRY_SIZE (bytes, default: 5 MiB)
    /// - QUEUE_ENABLED (default: true), MAX_QUEUE_SIZE (default: 10)
    /// - QUEUE_JOB_TIMEOUT, STATUS_RETENTION, ARTIFACT_RETENTION, SWEEP_INTERVAL (seconds)
    /// - REDIS_URL (default: unset, in-process store)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let queue_defaults = QueueConfig::default();

        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let path = |key: &str, default: PathBuf| var(key).map(PathBuf::from).unwrap_or(default);

        let config = Self {
            bind_addr: var("TEXFORGE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_concurrent_jobs: parse(&var, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?,
            compilation_timeout: seconds(&var, "COMPILATION_TIMEOUT", defaults.compilation_timeout)?,
            cleanup_delay: seconds(&var, "CLEANUP_DELAY", defaults.cleanup_delay)?,
            work_dir: path("WORK_DIR", defaults.work_dir),
            output_dir: path("OUTPUT_DIR", defaults.output_dir),
            upload_dir: path("UPLOAD_DIR", defaults.upload_dir),
            toolchain_dir: var("TOOLCHAIN_DIR").map(PathBuf::from),
            max_upload_size: parse(&var, "MAX_UPLOAD_SIZE", defaults.max_upload_size)?,
            archive_limits: ArchiveLimits {
                max_entries: parse(
                    &var,
                    "MAX_ARCHIVE_ENTRIES",
                    defaults.archive_limits.max_entries,
                )?,
                max_entry_size: parse(
                    &var,
                    "MAX_ENTRY_SIZE",
                    defaults.archive_limits.max_entry_size,
                )?,
            },
            queue: QueueConfig {
                enabled: parse(&var, "QUEUE_ENABLED", queue_defaults.enabled)?,
                max_queue_size: parse(&var, "MAX_QUEUE_SIZE", queue_defaults.max_queue_size)?,
                job_timeout: seconds(&var, "QUEUE_JOB_TIMEOUT", queue_defaults.job_timeout)?,
                status_retention: seconds(
                    &var,
                    "STATUS_RETENTION",
                    queue_defaults.status_retention,
                )?,
                artifact_retention: seconds(
                    &var,
                    "ARTIFACT_RETENTION",
                    queue_defaults.artifact_retention,
                )?,
                sweep_interval: seconds(&var, "SWEEP_INTERVAL", queue_defaults.sweep_interval)?,
                store_url: var("REDIS_URL").map(|url| url.trim().to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the service cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_jobs == 0 {
            bail!("MAX_CONCURRENT_JOBS must be at least 1");
        }
        if self.compilation_timeout.is_zero() {
            bail!("COMPILATION_TIMEOUT must be positive");
        }
        if self.max_upload_size == 0 {
            bail!("MAX_UPLOAD_SIZE must be positive");
        }
        if self.archive_limits.max_entries == 0 || self.archive_limits.max_entry_size == 0 {
            bail!("archive limits must be positive");
        }
        if self.queue.enabled {
            if self.queue.job_timeout.is_zero() {
                bail!("QUEUE_JOB_TIMEOUT must be positive");
            }
            if self.queue.sweep_interval.is_zero() {
                bail!("SWEEP_INTERVAL must be positive");
            }
            if self.queue.status_retention.is_zero() || self.queue.artifact_retention.is_zero() {
                bail!("retention periods must be positive");
            }
        }
        Ok(())
    }

    /// Runner settings derived from this configuration
    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig::new(self.toolchain_dir.clone(), self.archive_limits)
    }

    /// Longest grace period any published artifact set is promised
    pub fn output_retention(&self) -> Duration {
        if self.queue.enabled {
            self.cleanup_delay.max(self.queue.artifact_retention)
        } else {
            self.cleanup_delay
        }
    }

    /// Artifact layout derived from this configuration
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(self.work_dir.clone(), &self.output_dir)
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn seconds(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> anyhow::Result<Duration> {
    parse(var, key, default.as_secs()).map(Duration::from_secs)
}
