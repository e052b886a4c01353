//! Scheduler command execution
//!
//! Runs Slurm CLI tools (`squeue`, `scontrol`, `sstat`, `sacct`, ...) with a
//! bounded wait and folds every outcome into a [`CommandOutput`]. Nothing
//! past this boundary ever sees a spawn error or a timeout as an `Err`.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

/// Placeholder returned when a command succeeds without printing anything
pub const EMPTY_OUTPUT: &str = "(command completed successfully)";

/// Normalized result of one command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub ok: bool,
    /// stdout on success, trimmed stderr (or a generic message) on failure
    pub text: String,
}

impl CommandOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: text.into(),
        }
    }

    /// Output that actually carries data rows
    ///
    /// Slurm tools exit 0 and print "No job(s) found" when a job has no
    /// statistics; that is treated like a failure by callers.
    pub fn has_data(&self) -> bool {
        self.ok && !self.text.trim().is_empty() && !self.text.contains("No job(s) found")
    }
}

/// Runs external commands
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str, args: &[String]) -> CommandOutput;
}

/// Executor backed by real child processes
pub struct ProcessExecutor {
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, command: &str, args: &[String]) -> CommandOutput {
        debug!("Running command: {} {}", command, args.join(" "));

        let child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn {}: {}", command, e);
                return CommandOutput::failure(format!("failed to run {}: {}", command, e));
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("Failed to wait for {}: {}", command, e);
                return CommandOutput::failure(format!("failed to run {}: {}", command, e));
            }
            Err(_) => {
                error!("Command {} timed out after {:?}", command, self.timeout);
                return CommandOutput::failure(format!(
                    "{} timed out after {}s",
                    command,
                    self.timeout.as_secs()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            debug!("Command {} succeeded", command);
            return CommandOutput::success(if stdout.is_empty() {
                EMPTY_OUTPUT.to_string()
            } else {
                stdout.into_owned()
            });
        }

        error!(
            "Command {} failed with {}: {}",
            command,
            output.status,
            stderr.trim()
        );

        let stderr = stderr.trim();
        if stderr.is_empty() {
            CommandOutput::failure(format!("{} exited with {}", command, output.status))
        } else {
            CommandOutput::failure(stderr)
        }
    }
}
