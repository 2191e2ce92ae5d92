//! Collaborator contracts the engine calls into, plus the process-backed
//! implementations used by the CLI.
//!
//! The engine never spawns a process itself. Everything that touches the
//! outside world goes through one of these traits so tests can swap in
//! recording fakes.

use crate::context::{CommandResult, ExecOptions};
use crate::error::{Result, RolloutError};
use crate::host::Host;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Runs a command on the control machine.
pub trait LocalExecutor {
    fn run(&self, command: &str, opts: ExecOptions) -> Result<CommandResult>;
}

/// The only way a command reaches a remote host.
pub trait RemoteExecutor {
    fn execute(&self, host: &Host, command: &str, opts: ExecOptions) -> Result<CommandResult>;
}

pub trait ArtifactTransfer {
    fn upload(&self, local_path: &Path, host: &Host, remote_path: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub artifact: PathBuf,
    pub success: bool,
    pub message: String,
}

pub trait Builder {
    fn build(&self) -> Result<BuildOutput>;
}

/// Operational side channel. Callers log and drop errors from `notify`.
pub trait Notifier {
    fn notify(&self, message: &str) -> Result<()>;
}

/// Everything the engine needs to reach the outside world.
pub struct Collaborators {
    pub local: Box<dyn LocalExecutor>,
    pub remote: Box<dyn RemoteExecutor>,
    pub transfer: Box<dyn ArtifactTransfer>,
    pub builder: Box<dyn Builder>,
    pub notifier: Box<dyn Notifier>,
}

// ---------------------------------------------------------------------------
// SystemShell
// ---------------------------------------------------------------------------

/// `sh -c <command>` in a fixed working directory, inheriting the
/// environment of this process.
#[derive(Debug, Clone)]
pub struct SystemShell {
    workdir: PathBuf,
    envs: Vec<(String, String)>,
}

impl SystemShell {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            envs: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).current_dir(&self.workdir);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl LocalExecutor for SystemShell {
    fn run(&self, command: &str, _opts: ExecOptions) -> Result<CommandResult> {
        tracing::debug!(command, "local");
        let output = self.command(command).output()?;
        Ok(CommandResult::from_output(&output))
    }
}

// ---------------------------------------------------------------------------
// LocalTransport
// ---------------------------------------------------------------------------

/// Treats every host as the control machine: host commands run in a local
/// shell with `ROLLOUT_HOST` / `ROLLOUT_ADDRESS` set, and uploads are plain
/// file copies. Used for single-machine setups and dry rehearsals.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    shell: SystemShell,
}

impl LocalTransport {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            shell: SystemShell::new(workdir),
        }
    }
}

impl RemoteExecutor for LocalTransport {
    fn execute(&self, host: &Host, command: &str, _opts: ExecOptions) -> Result<CommandResult> {
        tracing::debug!(host = %host, command, "local transport");
        let output = self
            .shell
            .command(command)
            .env("ROLLOUT_HOST", &host.name)
            .env("ROLLOUT_ADDRESS", &host.address)
            .output()?;
        Ok(CommandResult::from_output(&output))
    }
}

impl ArtifactTransfer for LocalTransport {
    fn upload(&self, local_path: &Path, host: &Host, remote_path: &str) -> Result<()> {
        let dest = self.shell.workdir.join(remote_path);
        tracing::debug!(host = %host, src = %local_path.display(), dest = %dest.display(), "copy");
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let src = self.shell.workdir.join(local_path);
        std::fs::copy(&src, &dest).map_err(|e| {
            RolloutError::Transport(format!("copy {} -> {}: {e}", src.display(), dest.display()))
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CommandBuilder
// ---------------------------------------------------------------------------

/// Runs the configured build command and checks the artifact exists.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    shell: SystemShell,
    command: String,
    artifact: PathBuf,
}

impl CommandBuilder {
    pub fn new(root: &Path, command: impl Into<String>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            shell: SystemShell::new(root),
            command: command.into(),
            artifact: artifact.into(),
        }
    }
}

impl Builder for CommandBuilder {
    fn build(&self) -> Result<BuildOutput> {
        tracing::info!(command = %self.command, "building");
        let result = self.shell.run(&self.command, ExecOptions::default())?;
        let on_disk = self.shell.workdir.join(&self.artifact);
        let (success, message) = if !result.success() {
            (false, result.message())
        } else if !on_disk.exists() {
            (
                false,
                format!("build succeeded but {} is missing", self.artifact.display()),
            )
        } else {
            (true, format!("built {}", self.artifact.display()))
        };
        Ok(BuildOutput {
            artifact: self.artifact.clone(),
            success,
            message,
        })
    }
}

/// Stands in when `rollout.yaml` has no `build` section.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBuild;

impl Builder for NoBuild {
    fn build(&self) -> Result<BuildOutput> {
        Err(RolloutError::BuildFailed(
            "no build section in rollout.yaml".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Notifiers
// ---------------------------------------------------------------------------

/// Runs `<command> "<message>"` locally, e.g. a `message.sh` chat hook.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    shell: SystemShell,
    command: String,
}

impl CommandNotifier {
    pub fn new(root: &Path, command: impl Into<String>) -> Self {
        Self {
            shell: SystemShell::new(root),
            command: command.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        let script = format!("{} \"$1\"", self.command);
        let output = self
            .shell
            .command(&script)
            .arg("rollout-notify")
            .arg(message)
            .output()?;
        let result = CommandResult::from_output(&output);
        if !result.success() {
            return Err(RolloutError::Transport(format!(
                "notify command failed: {}",
                result.message()
            )));
        }
        Ok(())
    }
}

/// Logs the message and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        tracing::info!(message, "notify");
        Ok(())
    }
}
