//! External command execution
//!
//! Schemes drive the host through command-line tools (`ip`, `wg`, `uci`).
//! Every invocation goes through [`CommandRunner`] so a scheme can be
//! exercised against a scripted runner instead of a live system.

use crate::error::{KeymasterError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Default time a single external command may run
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status 0
    pub success: bool,
    /// Exit code, absent when the process was killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, feeding `stdin` when given.
    ///
    /// A non-zero exit is reported through [`CommandOutput::success`], not
    /// as an error. Errors mean the command could not be run at all.
    async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput>;

    /// Run a command that is expected to succeed and return its stdout
    async fn run_checked(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let output = self.run(program, args, stdin).await?;
        if !output.success {
            return Err(KeymasterError::Transport(format!(
                "Command failed: {} {}: {}",
                program,
                args.join(" "),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// [`CommandRunner`] backed by real processes
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    /// Create a runner that kills commands running longer than `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput> {
        debug!("Executing command: {} {:?}", program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                KeymasterError::Transport(format!(
                    "Failed to execute {} {}: {}",
                    program,
                    args.join(" "),
                    e
                ))
            })?;

        // Feeding stdin counts against the timeout too
        let pipe = child.stdin.take();
        let run = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                pipe.write_all(input.as_bytes()).await?;
                // Dropping the pipe closes it so the child sees EOF
            }
            child.wait_with_output().await
        };

        // On timeout the child is dropped, which kills it
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                KeymasterError::Timeout(format!(
                    "{} {} did not finish within {:?}",
                    program,
                    args.join(" "),
                    self.timeout
                ))
            })??;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
