//! Subprocess plumbing shared by the CLI-tool backends.
//!
//! Secrets are only ever passed on stdin, never as arguments, so they do
//! not show up in process listings.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Backend, Secret, StoreError};

/// Captured result of a finished tool invocation.
pub(crate) struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Secret,
    pub stderr: String,
}

impl ToolOutput {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Run `program` with `args`, optionally feeding `stdin`, and wait for it.
///
/// A missing binary maps to [`StoreError::Unavailable`].
pub(crate) async fn run_tool(
    backend: Backend,
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<ToolOutput, StoreError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            StoreError::Unavailable {
                backend,
                message: format!("`{}` is not installed", program),
            }
        } else {
            StoreError::Backend {
                backend,
                message: format!("failed to execute `{}`: {}", program, e),
            }
        }
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input)
                .await
                .map_err(|e| StoreError::Backend {
                    backend,
                    message: format!("failed to write to `{}`: {}", program, e),
                })?;
            // Dropping the pipe closes stdin so the tool sees EOF.
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| StoreError::Backend {
            backend,
            message: format!("failed while waiting for `{}`: {}", program, e),
        })?;

    Ok(ToolOutput {
        status: output.status,
        stdout: Secret::new(String::from_utf8_lossy(&output.stdout).trim().to_string()),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
