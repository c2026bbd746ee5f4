//! Runs a tool's command list as child processes.
//!
//! Each command is its own process. The tool's environment overlay is set on
//! the child only, so concurrent tools never see each other's variables and
//! the parent environment is never touched. On unix every command leads its
//! own process group, so a timeout or cancellation takes down pipelines and
//! subshells along with the shell itself.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use crate::definition::CommandSpec;
use crate::error::ExecutionError;
use crate::util::tail_chars;

/// Upper bound on the captured output kept in an [`ExecutionError`].
pub const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// Executes `commands` in order, stopping at the first failure.
///
/// `timeout` applies to every command separately. When `cancel` fires, the
/// running child is killed and [`ExecutionError::Cancelled`] is returned.
/// Command indexes in errors are 1-based.
pub async fn execute(
    commands: &[CommandSpec],
    environ: &[(String, String)],
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), ExecutionError> {
    for (position, spec) in commands.iter().enumerate() {
        run_command(position + 1, spec, environ, timeout, cancel).await?;
    }
    Ok(())
}

fn build_command(spec: &CommandSpec) -> Option<Command> {
    match spec {
        CommandSpec::ShellLine(line) => {
            #[cfg(windows)]
            let mut cmd = {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C");
                cmd
            };
            #[cfg(not(windows))]
            let mut cmd = {
                let mut cmd = Command::new("sh");
                cmd.arg("-c");
                cmd
            };
            cmd.arg(line);
            Some(cmd)
        }
        CommandSpec::Argv(argv) => {
            let (program, args) = argv.split_first()?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            Some(cmd)
        }
    }
}

async fn run_command(
    index: usize,
    spec: &CommandSpec,
    environ: &[(String, String)],
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), ExecutionError> {
    let command = spec.to_string();
    if cancel.is_cancelled() {
        return Err(ExecutionError::Cancelled { index, command });
    }
    debug!(index, %command, "running command");

    let Some(mut cmd) = build_command(spec) else {
        return Err(ExecutionError::Spawn {
            index,
            command,
            reason: "empty command".to_string(),
        });
    };
    cmd.envs(environ.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
        index,
        command: command.clone(),
        reason: e.to_string(),
    })?;
    let pid = child.id();

    let deadline = async {
        match timeout {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        result = child.wait_with_output() => result.map_err(|e| ExecutionError::Spawn {
            index,
            command: command.clone(),
            reason: e.to_string(),
        })?,
        _ = deadline => {
            debug!(index, %command, "command timed out");
            kill_process_group(pid);
            return Err(ExecutionError::Timeout {
                index,
                command,
                after: timeout.unwrap_or_default(),
            });
        }
        _ = cancel.cancelled() => {
            debug!(index, %command, "command cancelled");
            kill_process_group(pid);
            return Err(ExecutionError::Cancelled { index, command });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(index, stdout = %stdout, stderr = %stderr, "command output");

    if output.status.success() {
        return Ok(());
    }
    let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(ExecutionError::NonZeroExit {
        index,
        command,
        code: output.status.code(),
        output: tail_chars(&diagnostic, MAX_DIAGNOSTIC_CHARS),
    })
}

/// Kills every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this child.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "could not kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
