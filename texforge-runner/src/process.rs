//! Subprocess execution
//!
//! Runs toolchain binaries as black boxes: a working directory and arguments
//! go in, an exit status and the combined stdout+stderr text come out.
//!
//! Every invocation is bound to the job's [`Deadline`]. When it fires first
//! the whole process group is killed and reaped, and the failure is reported
//! as [`CommandError::TimedOut`] rather than as a generic error.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::deadline::Deadline;

/// How long output is still read once the process has exited
///
/// A background process it started may hold the pipes open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors raised while running a subprocess
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command {program} timed out")]
    TimedOut { program: String },

    #[error("failed to collect output of {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::TimedOut { .. })
    }
}

/// Exit status and combined output of a finished subprocess
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// stdout followed by stderr, lossily decoded
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, `None` when the process was killed by a signal
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Runs `program` in `dir` until it exits or `deadline` fires
///
/// A non-zero exit is not an error here; callers decide whether it is fatal.
pub async fn run_command(
    dir: &Path,
    program: &OsStr,
    args: &[OsString],
    deadline: &Deadline,
) -> Result<CommandOutput, CommandError> {
    let name = display_name(program);

    if deadline.is_expired() {
        return Err(CommandError::TimedOut { program: name });
    }

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    debug!("Running {} {:?} in {}", name, args, dir.display());

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        program: name.clone(),
        source,
    })?;
    // `Child::id` is gone once the child has been reaped
    let pid = child.id();

    let finished = tokio::select! {
        result = collect(&mut child) => Some(result),
        _ = deadline.expired() => None,
    };

    match finished {
        Some(Ok(collected)) => {
            debug!("{} exited with {}", name, collected.status);
            if collected.lingering {
                warn!("{} left processes holding its output open, killing them", name);
                kill_group(pid, &name);
            }
            Ok(CommandOutput {
                status: collected.status,
                output: collected.output,
            })
        }
        Some(Err(source)) => {
            terminate(&mut child, pid, &name).await;
            Err(CommandError::Io {
                program: name,
                source,
            })
        }
        None => {
            warn!("Deadline reached, killing {}", name);
            terminate(&mut child, pid, &name).await;
            Err(CommandError::TimedOut { program: name })
        }
    }
}

struct Collected {
    status: ExitStatus,
    output: String,
    /// The pipes were still open when draining gave up
    lingering: bool,
}

/// Waits for the exit status while reading stdout and stderr
///
/// The exit status decides completion; output still arriving afterwards is
/// read for at most [`DRAIN_TIMEOUT`].
async fn collect(child: &mut Child) -> io::Result<Collected> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out = Vec::new();
    let mut err = Vec::new();

    let (status, lingering) = {
        let reading = async {
            tokio::try_join!(
                drain(stdout.as_mut(), &mut out),
                drain(stderr.as_mut(), &mut err)
            )
        };
        tokio::pin!(reading);

        let exited = tokio::select! {
            read = &mut reading => {
                read?;
                None
            }
            status = child.wait() => Some(status?),
        };

        match exited {
            None => (child.wait().await?, false),
            Some(status) => match tokio::time::timeout(DRAIN_TIMEOUT, &mut reading).await {
                Ok(read) => {
                    read?;
                    (status, false)
                }
                Err(_) => (status, true),
            },
        }
    };

    out.extend_from_slice(&err);
    Ok(Collected {
        status,
        output: String::from_utf8_lossy(&out).into_owned(),
        lingering,
    })
}

/// Reads a pipe to its end; bytes read before a cancellation are kept
async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> io::Result<()> {
    let Some(pipe) = pipe else {
        return Ok(());
    };
    loop {
        buf.reserve(8 * 1024);
        if pipe.read_buf(buf).await? == 0 {
            return Ok(());
        }
    }
}

/// Kills the child's process group, then the child itself, and reaps it
async fn terminate(child: &mut Child, pid: Option<u32>, name: &str) {
    kill_group(pid, name);

    if let Err(e) = child.kill().await {
        debug!("Failed to kill {}: {}", name, e);
    }
}

/// Sends SIGKILL to the process group led by `pid`
fn kill_group(pid: Option<u32>, name: &str) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("Failed to kill process group of {}: {}", name, e);
        }
    }
    #[cfg(not(unix))]
    let _ = (pid, name);
}

fn display_name(program: &OsStr) -> String {
    Path::new(program)
        .file_name()
        .unwrap_or(program)
        .to_string_lossy()
        .into_owned()
}
