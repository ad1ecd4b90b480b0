//! Scripted [`ToolRunner`] for tests that must not depend on nmap or tshark.
//!
//! Rules are matched in the order they were added; the first rule whose
//! program (and optional argument) matches supplies the response. An
//! invocation no rule matches behaves like a missing binary.

use crate::command::{ToolInvocation, ToolOutput, ToolRunner};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// What a matched rule does.
#[derive(Debug, Clone)]
pub enum Response {
    /// Return this output
    Output(ToolOutput),
    /// Fail as if the binary did not exist
    NotFound,
    /// Panic with this message
    Panic(String),
    /// Never finish
    Hang,
    /// Wait for the notification, then return the output
    Gate(Arc<Notify>, ToolOutput),
    /// Create an empty file at the `-w` argument, then return the output
    Capture(ToolOutput),
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    arg: Option<String>,
    response: Response,
}

impl Rule {
    fn matches(&self, invocation: &ToolInvocation) -> bool {
        let program = Path::new(&invocation.program)
            .file_name()
            .map_or_else(|| invocation.program.clone(), |n| n.to_string_lossy().into_owned());
        program == self.program
            && self
                .arg
                .as_deref()
                .map_or(true, |arg| invocation.has_arg(arg))
    }
}

/// Test double that answers tool invocations from a fixed script.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    /// Runner with no rules; every invocation reports a missing tool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for any invocation of `program`.
    #[must_use]
    pub fn respond(mut self, program: &str, arg: Option<&str>, response: Response) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            arg: arg.map(str::to_string),
            response,
        });
        self
    }

    /// Return `output` for `program`.
    #[must_use]
    pub fn on(self, program: &str, output: ToolOutput) -> Self {
        self.respond(program, None, Response::Output(output))
    }

    /// Return `output` for `program` invocations that include `arg`.
    #[must_use]
    pub fn on_args(self, program: &str, arg: &str, output: ToolOutput) -> Self {
        self.respond(program, Some(arg), Response::Output(output))
    }

    /// Write the `-w` capture file, then return `output`.
    #[must_use]
    pub fn capture_on_args(self, program: &str, arg: &str, output: ToolOutput) -> Self {
        self.respond(program, Some(arg), Response::Capture(output))
    }

    /// Panic whenever `program` runs.
    #[must_use]
    pub fn panic_on(self, program: &str, message: &str) -> Self {
        self.respond(program, None, Response::Panic(message.to_string()))
    }

    /// Never return from `program`.
    #[must_use]
    pub fn hang_on(self, program: &str) -> Self {
        self.respond(program, None, Response::Hang)
    }

    /// Hold `program` until `gate` is notified, then return `output`.
    #[must_use]
    pub fn gate_on(self, program: &str, gate: Arc<Notify>, output: ToolOutput) -> Self {
        self.respond(program, None, Response::Gate(gate, output))
    }

    /// Every invocation received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        let response = self
            .rules
            .iter()
            .find(|rule| rule.matches(invocation))
            .map(|rule| rule.response.clone())
            .unwrap_or(Response::NotFound);

        match response {
            Response::Output(output) => Ok(output),
            Response::NotFound => Err(ScanError::ToolNotFound {
                program: invocation.program.clone(),
            }),
            Response::Panic(message) => panic!("{message}"),
            Response::Hang => std::future::pending().await,
            Response::Gate(gate, output) => {
                gate.notified().await;
                Ok(output)
            }
            Response::Capture(output) => {
                if let Some(path) = invocation.arg_after("-w") {
                    std::fs::write(path, b"")?;
                }
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new()
            .on_args("tshark", "-r", ToolOutput::success("read"))
            .on("tshark", ToolOutput::success("any"));

        let read = runner
            .run(&ToolInvocation::new("/usr/bin/tshark").args(["-r", "x.pcap"]))
            .await
            .unwrap();
        let other = runner
            .run(&ToolInvocation::new("tshark").args(["-i", "eth0"]))
            .await
            .unwrap();

        assert_eq!(read.stdout_str(), "read");
        assert_eq!(other.stdout_str(), "any");
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unmatched_is_not_found() {
        let runner = ScriptedRunner::new().on("nmap", ToolOutput::success(""));
        let result = runner.run(&ToolInvocation::new("tshark")).await;
        assert!(matches!(result, Err(ScanError::ToolNotFound { .. })));
    }
}
