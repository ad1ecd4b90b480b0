//! External tool invocation.
//!
//! Scanners never spawn processes directly; they describe a [`ToolInvocation`]
//! and hand it to a [`ToolRunner`]. The production runner is
//! [`ProcessRunner`]; tests substitute [`crate::testing::ScriptedRunner`].

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A named executable plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable name or path
    pub program: String,
    /// Arguments, one argv entry each
    pub args: Vec<String>,
    /// Working directory for the child process
    pub working_dir: Option<PathBuf>,
    /// Upper bound on the child's run time
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    /// Start describing an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir`.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the child if it runs longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value following `flag` in the argument vector, if any.
    #[must_use]
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Whether any argument equals `arg`.
    #[must_use]
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: Vec<u8>,
    /// Captured standard error
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Output of a process that exited with status 0.
    #[must_use]
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Output of a process that exited with a non-zero status.
    #[must_use]
    pub fn failure(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status 0.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output decoded lossily.
    #[must_use]
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily.
    #[must_use]
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Trimmed stderr, or a description of the exit status when stderr is empty.
    #[must_use]
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr_str();
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Sole interface to external scanning tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the tool to completion and capture its output.
    ///
    /// A non-zero exit status is not an error at this layer; it is reported
    /// through [`ToolOutput::exit_code`].
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Runs tools as child processes.
///
/// Children are spawned with `kill_on_drop`, so dropping the future (task
/// abort, timeout, cancellation) terminates the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a process runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(
            program = %invocation.program,
            args = ?invocation.args,
            "Spawning external tool"
        );

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScanError::ToolNotFound {
                    program: invocation.program.clone(),
                }
            } else {
                ScanError::ToolFailed {
                    program: invocation.program.clone(),
                    reason: format!("failed to start: {e}"),
                }
            }
        })?;

        let output = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ScanError::ToolFailed {
                    program: invocation.program.clone(),
                    reason: format!("timed out after {limit:?}"),
                })??,
            None => child.wait_with_output().await?,
        };

        tracing::debug!(
            program = %invocation.program,
            exit_code = ?output.status.code(),
            stdout_bytes = output.stdout.len(),
            "External tool exited"
        );

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let invocation = ToolInvocation::new("nmap")
            .args(["-sV", "-T4"])
            .arg("-p")
            .arg("1-100")
            .timeout(Duration::from_secs(5));

        assert_eq!(invocation.args, vec!["-sV", "-T4", "-p", "1-100"]);
        assert_eq!(invocation.arg_after("-p"), Some("1-100"));
        assert_eq!(invocation.arg_after("-oX"), None);
        assert!(invocation.has_arg("-T4"));
        assert_eq!(invocation.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_failure_reason() {
        let out = ToolOutput::failure(1, "  Failed to resolve \"nohost\".\n");
        assert!(!out.succeeded());
        assert_eq!(out.failure_reason(), "Failed to resolve \"nohost\".");

        let out = ToolOutput::failure(2, "");
        assert_eq!(out.failure_reason(), "exited with status 2");
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(&ToolInvocation::new("netscope-no-such-tool-7f3a"))
            .await;
        assert!(matches!(result, Err(ScanError::ToolNotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_exit_code_and_streams() {
        let runner = ProcessRunner::new();
        let out = runner
            .run(&ToolInvocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .expect("run sh");

        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout_str().trim(), "out");
        assert_eq!(out.stderr_str().trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(
                &ToolInvocation::new("sleep")
                    .arg("5")
                    .timeout(Duration::from_millis(100)),
            )
            .await;

        match result {
            Err(ScanError::ToolFailed { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
