//! Per-invocation state: invoked-set, call stack, artifact, and outcome log.
//!
//! A `Run` is the only mutable state in an execution. The engine borrows it
//! mutably for the whole invocation, so a `Run` cannot be shared between
//! concurrent invocations; create one per top-level task.

use crate::error::{Result, RolloutError};
use crate::task::TaskName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one step in one execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub task: String,
    /// `local` or the host name.
    pub host: String,
    pub command: String,
    pub success: bool,
    pub message: String,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Finished, but at least one contained step failed.
    SuccessWithWarnings,
    /// A hard-fail step failed; later steps and hosts never ran.
    Aborted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::SuccessWithWarnings => "success_with_warnings",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Run {
    id: Uuid,
    started_at: DateTime<Utc>,
    invoked: HashSet<TaskName>,
    stack: Vec<TaskName>,
    outcomes: Vec<Outcome>,
    artifact: Option<PathBuf>,
    aborted: bool,
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

impl Run {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            invoked: HashSet::new(),
            stack: Vec::new(),
            outcomes: Vec::new(),
            artifact: None,
            aborted: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Failed outcomes that did not abort the run.
    pub fn warnings(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub(crate) fn set_artifact(&mut self, path: PathBuf) {
        self.artifact = Some(path);
    }

    pub fn has_invoked(&self, name: &TaskName) -> bool {
        self.invoked.contains(name)
    }

    pub(crate) fn mark_invoked(&mut self, name: &TaskName) {
        self.invoked.insert(name.clone());
    }

    /// Push `name` onto the call stack, failing if it is already on it.
    pub(crate) fn enter(&mut self, name: &TaskName) -> Result<()> {
        if self.stack.contains(name) {
            let mut chain: Vec<String> = self.stack.iter().map(|n| n.to_string()).collect();
            chain.push(name.to_string());
            return Err(RolloutError::CyclicInvocation(chain));
        }
        self.stack.push(name.clone());
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    pub fn status(&self) -> RunStatus {
        if self.aborted {
            RunStatus::Aborted
        } else if self.outcomes.iter().any(|o| !o.success) {
            RunStatus::SuccessWithWarnings
        } else {
            RunStatus::Success
        }
    }

    /// Freeze the run into a serializable report.
    pub fn into_report(self, task: &TaskName, error: Option<String>) -> RunReport {
        RunReport {
            id: self.id,
            task: task.to_string(),
            status: self.status(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcomes: self.outcomes,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: Uuid,
    pub task: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<Outcome>,
    /// The abort reason when `status` is `Aborted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn warnings(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}
