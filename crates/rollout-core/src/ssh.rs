//! `ssh`/`scp` backed transport.
//!
//! Authentication, host keys and timeouts are left to the OpenSSH client and
//! its config; this module only builds argument lists and collects results.

use crate::collab::{ArtifactTransfer, RemoteExecutor};
use crate::context::{CommandResult, ExecOptions};
use crate::error::{Result, RolloutError};
use crate::host::Host;
use crate::paths;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// ssh exits 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

#[derive(Debug, Clone, Default)]
pub struct SshSettings {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
    pub connect_timeout: Option<u32>,
    /// Extra `-o Key=Value` options.
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SshTransport {
    ssh: PathBuf,
    scp: PathBuf,
    /// Relative local paths given to `upload` resolve against this.
    workdir: PathBuf,
    settings: SshSettings,
}

impl SshTransport {
    /// Locate `ssh` and `scp` on `PATH`.
    pub fn detect(workdir: impl Into<PathBuf>, settings: SshSettings) -> Result<Self> {
        let ssh = which::which("ssh")
            .map_err(|e| RolloutError::Transport(format!("ssh not found on PATH: {e}")))?;
        let scp = which::which("scp")
            .map_err(|e| RolloutError::Transport(format!("scp not found on PATH: {e}")))?;
        Ok(Self {
            ssh,
            scp,
            workdir: workdir.into(),
            settings,
        })
    }

    fn common_args(&self, host: &Host, port_flag: &str) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(secs) = self.settings.connect_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={secs}"));
        }
        for opt in &self.settings.options {
            args.push("-o".to_string());
            args.push(opt.clone());
        }
        if let Some(port) = host.port.or(self.settings.port) {
            args.push(port_flag.to_string());
            args.push(port.to_string());
        }
        let identity = host
            .identity_file
            .as_deref()
            .or(self.settings.identity_file.as_deref());
        if let Some(identity) = identity {
            args.push("-i".to_string());
            args.push(paths::expand_home(identity).display().to_string());
        }
        args
    }

    pub fn ssh_args(&self, host: &Host, command: &str, opts: ExecOptions) -> Vec<String> {
        let mut args = self.common_args(host, "-p");
        if opts.pty {
            args.push("-tt".to_string());
        }
        args.push(host.destination(self.settings.user.as_deref()));
        args.push(command.to_string());
        args
    }

    pub fn scp_args(&self, local_path: &Path, host: &Host, remote_path: &str) -> Vec<String> {
        let mut args = self.common_args(host, "-P");
        args.push("-p".to_string());
        args.push(local_path.display().to_string());
        args.push(format!(
            "{}:{remote_path}",
            host.destination(self.settings.user.as_deref())
        ));
        args
    }
}

impl RemoteExecutor for SshTransport {
    fn execute(&self, host: &Host, command: &str, opts: ExecOptions) -> Result<CommandResult> {
        tracing::debug!(host = %host, command, pty = opts.pty, "ssh");
        let output = Command::new(&self.ssh)
            .args(self.ssh_args(host, command, opts))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RolloutError::Transport(format!("failed to spawn ssh: {e}")))?;
        let result = CommandResult::from_output(&output);
        if result.exit_status == Some(SSH_CONNECTION_FAILURE) {
            return Err(RolloutError::Transport(format!(
                "ssh to {} failed: {}",
                host.address,
                result.stderr_tail.trim()
            )));
        }
        Ok(result)
    }
}

impl ArtifactTransfer for SshTransport {
    fn upload(&self, local_path: &Path, host: &Host, remote_path: &str) -> Result<()> {
        tracing::info!(host = %host, src = %local_path.display(), dest = remote_path, "scp");
        let output = Command::new(&self.scp)
            .args(self.scp_args(local_path, host, remote_path))
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RolloutError::Transport(format!("failed to spawn scp: {e}")))?;
        let result = CommandResult::from_output(&output);
        if !result.success() {
            return Err(RolloutError::Transport(format!(
                "scp to {} failed: {}",
                host.address,
                result.message()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(settings: SshSettings) -> SshTransport {
        SshTransport {
            ssh: PathBuf::from("ssh"),
            scp: PathBuf::from("scp"),
            workdir: PathBuf::from("."),
            settings,
        }
    }

    #[test]
    fn ssh_args_with_pty_and_defaults() {
        let t = transport(SshSettings {
            user: Some("deploy".into()),
            port: Some(2222),
            identity_file: Some("/keys/id".into()),
            connect_timeout: Some(10),
            options: vec!["StrictHostKeyChecking=no".into()],
        });
        let args = t.ssh_args(
            &Host::new("h1", "10.0.0.1"),
            "nohup ./node &",
            ExecOptions { pty: true },
        );
        assert_eq!(
            args,
            [
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-o",
                "StrictHostKeyChecking=no",
                "-p",
                "2222",
                "-i",
                "/keys/id",
                "-tt",
                "deploy@10.0.0.1",
                "nohup ./node &",
            ]
        );
    }

    #[test]
    fn host_settings_override_transport_defaults() {
        let t = transport(SshSettings {
            user: Some("deploy".into()),
            port: Some(22),
            ..SshSettings::default()
        });
        let mut host = Host::new("h2", "10.0.0.2");
        host.user = Some("ops".into());
        host.port = Some(2200);
        let args = t.ssh_args(&host, "uptime", ExecOptions::default());
        assert!(args.windows(2).any(|w| w == ["-p", "2200"]));
        assert_eq!(args[args.len() - 2], "ops@10.0.0.2");
        assert!(!args.contains(&"-tt".to_string()));
    }

    #[test]
    fn scp_uses_capital_port_flag() {
        let t = transport(SshSettings {
            port: Some(2222),
            ..SshSettings::default()
        });
        let args = t.scp_args(Path::new("build/node"), &Host::new("h1", "10.0.0.1"), "/opt/node");
        assert!(args.windows(2).any(|w| w == ["-P", "2222"]));
        assert_eq!(args[args.len() - 2], "build/node");
        assert_eq!(args[args.len() - 1], "10.0.0.1:/opt/node");
    }
}
