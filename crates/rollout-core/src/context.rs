//! Execution contexts: where a command step runs.
//!
//! A task scoped to `local` gets a single [`ExecutionContext::Local`]; a task
//! scoped to `role:<name>` gets one [`ExecutionContext::Remote`] per resolved
//! host, visited in host order.

use crate::collab::Collaborators;
use crate::error::Result;
use crate::host::Host;
use serde::{Deserialize, Serialize};

/// Lines of stdout/stderr kept on a [`CommandResult`].
pub const TAIL_LINES: usize = 20;

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// `None` when the process was killed by a signal.
    pub exit_status: Option<i32>,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

impl CommandResult {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_status: Some(0),
            stdout_tail: stdout.into(),
            stderr_tail: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_status: Some(code),
            stdout_tail: String::new(),
            stderr_tail: stderr.into(),
        }
    }

    pub fn from_output(output: &std::process::Output) -> Self {
        Self {
            exit_status: output.status.code(),
            stdout_tail: tail(&String::from_utf8_lossy(&output.stdout), TAIL_LINES),
            stderr_tail: tail(&String::from_utf8_lossy(&output.stderr), TAIL_LINES),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// One-line summary for the outcome log.
    pub fn message(&self) -> String {
        let detail = if !self.stderr_tail.trim().is_empty() {
            self.stderr_tail.trim()
        } else {
            self.stdout_tail.trim()
        };
        let last = detail.lines().last().unwrap_or("");
        match (self.success(), self.exit_status) {
            (true, _) => last.to_string(),
            (false, Some(code)) if last.is_empty() => format!("exit status {code}"),
            (false, Some(code)) => format!("exit status {code}: {last}"),
            (false, None) => "terminated by signal".to_string(),
        }
    }
}

/// Last `lines` lines of `text`.
pub fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

// ---------------------------------------------------------------------------
// ExecOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Allocate a pseudo-terminal; needed for `nohup ... &` launches that
    /// must outlive the session.
    pub pty: bool,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum ExecutionContext<'h> {
    Local,
    Remote(&'h Host),
}

impl<'h> ExecutionContext<'h> {
    /// Label recorded in the outcome log: `local` or the host name.
    pub fn label(&self) -> &str {
        match self {
            ExecutionContext::Local => "local",
            ExecutionContext::Remote(host) => &host.name,
        }
    }

    pub fn host(&self) -> Option<&'h Host> {
        match self {
            ExecutionContext::Local => None,
            ExecutionContext::Remote(host) => Some(*host),
        }
    }

    /// Run `command` here and wait for it to finish.
    ///
    /// `Err` means the command never produced an exit status (spawn or
    /// transport failure); a non-zero exit is an `Ok` result.
    pub fn run(
        &self,
        collab: &Collaborators,
        command: &str,
        opts: ExecOptions,
    ) -> Result<CommandResult> {
        match self {
            ExecutionContext::Local => collab.local.run(command, opts),
            ExecutionContext::Remote(host) => collab.remote.execute(host, command, opts),
        }
    }
}
