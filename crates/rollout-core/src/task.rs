//! Task definitions: names, scopes, and the steps that make up a body.

use crate::error::{Result, RolloutError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// TaskName
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_\-]*(:[a-z][a-z0-9_\-]*)+$").unwrap()
    })
}

/// Fully-qualified task name, `namespace:short-name`.
///
/// Namespaces may nest (`deploy:sidecar:start`); the short name is always the
/// last segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskName(String);

impl TaskName {
    pub fn parse(name: &str) -> Result<Self> {
        if name.len() > 128 || !name_re().is_match(name) {
            return Err(RolloutError::InvalidTaskName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        self.0.rsplit_once(':').map(|(ns, _)| ns).unwrap_or("")
    }

    pub fn short_name(&self) -> &str {
        self.0.rsplit_once(':').map(|(_, s)| s).unwrap_or(&self.0)
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskName {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskName {
    type Error = RolloutError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TaskName> for String {
    fn from(value: TaskName) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Where a task body runs: once on the control machine, or once per host of
/// a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    Local,
    Role(String),
}

impl Scope {
    pub fn role(name: impl Into<String>) -> Self {
        Scope::Role(name.into())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Local => f.write_str("local"),
            Scope::Role(role) => write!(f, "role:{role}"),
        }
    }
}

impl FromStr for Scope {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "local" {
            return Ok(Scope::Local);
        }
        match s.strip_prefix("role:") {
            Some(role) if !role.is_empty() => Ok(Scope::Role(role.to_string())),
            _ => Err(RolloutError::InvalidScope(s.to_string())),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = RolloutError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// InvokeMode / FailurePolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeMode {
    /// Run the body every time.
    #[default]
    Always,
    /// Run the body at most once per Run.
    Once,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record step failures as warnings and keep going.
    #[default]
    Contain,
    /// The first step failure aborts the whole Run.
    HardFail,
}

impl fmt::Display for InvokeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvokeMode::Always => "always",
            InvokeMode::Once => "once",
        })
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::Contain => "contain",
            FailurePolicy::HardFail => "hard_fail",
        })
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One entry in a task body.
///
/// Command strings may use `{host}`, `{address}` and `{run_id}`; they are
/// substituted per execution context before the command runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        pty: bool,
    },
    Invoke {
        task: TaskName,
        #[serde(default)]
        mode: InvokeMode,
        #[serde(default)]
        policy: FailurePolicy,
    },
    /// Run the build collaborator; the artifact path is kept on the Run.
    Build,
    /// Ship `local_path` (or the Run's built artifact) to each host.
    Upload {
        remote_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_path: Option<PathBuf>,
    },
    Notify {
        message: String,
    },
}

impl Step {
    pub fn command(command: impl Into<String>) -> Self {
        Step::Command {
            command: command.into(),
            pty: false,
        }
    }

    pub fn pty(command: impl Into<String>) -> Self {
        Step::Command {
            command: command.into(),
            pty: true,
        }
    }

    pub fn invoke(task: TaskName, mode: InvokeMode, policy: FailurePolicy) -> Self {
        Step::Invoke { task, mode, policy }
    }

    pub fn upload(remote_path: impl Into<String>) -> Self {
        Step::Upload {
            remote_path: remote_path.into(),
            local_path: None,
        }
    }

    pub fn notify(message: impl Into<String>) -> Self {
        Step::Notify {
            message: message.into(),
        }
    }

    /// Text recorded as the "command" of this step's outcome.
    pub fn label(&self) -> String {
        match self {
            Step::Command { command, .. } => command.clone(),
            Step::Invoke { task, .. } => format!("invoke {task}"),
            Step::Build => "build".to_string(),
            Step::Upload { remote_path, .. } => format!("upload {remote_path}"),
            Step::Notify { message } => format!("notify {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: TaskName,
    pub description: String,
    pub scope: Scope,
    pub steps: Vec<Step>,
}

impl Task {
    pub fn new(name: TaskName, description: impl Into<String>, scope: Scope) -> Self {
        Self {
            name,
            description: description.into(),
            scope,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Names of tasks this body invokes, in step order.
    pub fn invoked(&self) -> impl Iterator<Item = &TaskName> {
        self.steps.iter().filter_map(|s| match s {
            Step::Invoke { task, .. } => Some(task),
            _ => None,
        })
    }
}
