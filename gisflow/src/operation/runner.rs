//! Execution substrate for unit operations.
//!
//! The default [`ProcessRunner`] spawns the command as a child process on the
//! tokio runtime. Alternative runners (in-process library calls, remote
//! executors, test doubles) implement [`CommandRunner`].

use async_trait::async_trait;
use gisflow_shared::errors::{ExitStatusCode, GisflowError, GisflowResult};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Diagnostics kept from a failing process (tail of stderr).
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// A fully rendered command line, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    /// Raw OS strings so non-UTF-8 paths reach the tool unchanged.
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Shell-like rendering for logs. Lossy for non-UTF-8 arguments.
    pub fn display_line(&self) -> String {
        std::iter::once(self.command.clone())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

/// Trait for anything able to execute an [`Invocation`].
///
/// Implementations must be reentrant: a single runner is shared by every
/// clone of an operation and may run many invocations concurrently.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute the invocation, returning `ExternalProcessFailure` on any failure.
    async fn run(&self, invocation: &Invocation) -> GisflowResult<RunOutput>;

    /// Human-readable runner name for logging.
    fn name(&self) -> &str;
}

/// Runs invocations as child processes.
///
/// The child is killed if the future is dropped (cancellation) or the
/// invocation's timeout elapses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> GisflowResult<RunOutput> {
        let start = Instant::now();

        let mut cmd = Command::new(&invocation.command);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            let err_msg = format!("failed to launch: {}", e);
            tracing::error!(command = %invocation.command, "{}", err_msg);
            GisflowError::ExternalProcessFailure {
                command: invocation.command.clone(),
                status: ExitStatusCode(None),
                diagnostics: err_msg,
            }
        })?;

        let pid = child.id();
        tracing::debug!(command = %invocation.command, pid = ?pid, "Spawned external command");

        let waited = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                // Dropping the wait future drops the child, which kills it.
                Err(_) => {
                    tracing::warn!(command = %invocation.command, pid = ?pid, timeout_ms = limit.as_millis() as u64, "External command timed out");
                    return Err(GisflowError::ExternalProcessFailure {
                        command: invocation.command.clone(),
                        status: ExitStatusCode(None),
                        diagnostics: format!("timed out after {}ms", limit.as_millis()),
                    });
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| GisflowError::ExternalProcessFailure {
            command: invocation.command.clone(),
            status: ExitStatusCode(None),
            diagnostics: format!("failed to wait for process: {}", e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let duration_ms = start.elapsed().as_millis();

        if !output.status.success() {
            let diagnostics = if stderr.trim().is_empty() {
                tail(&stdout)
            } else {
                tail(&stderr)
            };
            tracing::warn!(
                command = %invocation.command,
                status = ?output.status.code(),
                diagnostics = %diagnostics,
                "External command failed"
            );
            return Err(GisflowError::ExternalProcessFailure {
                command: invocation.command.clone(),
                status: ExitStatusCode(output.status.code()),
                diagnostics,
            });
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(command = %invocation.command, stderr = %tail(&stderr), "External command wrote to stderr");
        }

        Ok(RunOutput {
            stdout,
            stderr,
            duration_ms,
        })
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Last `MAX_DIAGNOSTIC_BYTES` of `text`, trimmed, on a char boundary.
fn tail(text: &str) -> String {
    let text = text.trim();
    if text.len() <= MAX_DIAGNOSTIC_BYTES {
        return text.to_string();
    }
    let mut cut = text.len() - MAX_DIAGNOSTIC_BYTES;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &text[cut..])
}
