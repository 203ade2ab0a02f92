//! Small process-related helpers shared across the workspace.
//!
//! Besides the platform-neutral command constructors, this crate provides
//! [`output_with_cancel`], which runs a child process to completion while
//! watching a [`CancellationToken`]. When the token fires the child is
//! killed instead of being waited on.

#[cfg(feature = "tokio")]
use std::ffi::OsStr;

#[cfg(feature = "tokio")]
pub use tokio_util::sync::CancellationToken;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Errors raised while driving a child process.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },
}

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: std::process::ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout followed by stderr, lossily decoded and trimmed.
    ///
    /// ffmpeg writes its diagnostics to stderr even for successful runs, so
    /// callers that want "whatever the tool said" should use this.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr);
        if !text.is_empty() && !stderr.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
        text.trim().to_string()
    }

    /// Stdout only, lossily decoded and trimmed.
    pub fn stdout_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

#[cfg(feature = "tokio")]
async fn read_pipe<R>(pipe: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe
        && let Err(e) = pipe.read_to_end(&mut buf).await
    {
        tracing::debug!(error = %e, "Failed to drain child pipe");
    }
    buf
}

/// Run `cmd` to completion and capture its output, killing the child if
/// `token` is cancelled first.
///
/// Stdin is closed, stdout and stderr are piped. The child is also marked
/// `kill_on_drop` so an aborted caller never leaks a running process.
#[cfg(feature = "tokio")]
pub async fn output_with_cancel(
    cmd: &mut tokio::process::Command,
    token: &CancellationToken,
) -> Result<CommandOutput, CommandError> {
    use std::process::Stdio;

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    if token.is_cancelled() {
        return Err(CommandError::Cancelled { program });
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
    let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

    let status = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!(program = %program, "Cancellation requested, killing child");
            if let Err(e) = child.kill().await {
                tracing::warn!(program = %program, error = %e, "Failed to kill child process");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(CommandError::Cancelled { program });
        }
        status = child.wait() => status.map_err(|source| CommandError::Wait {
            program: program.clone(),
            source,
        })?,
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}
