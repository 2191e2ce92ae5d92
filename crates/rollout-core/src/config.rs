use crate::collab::{
    Builder, Collaborators, CommandBuilder, CommandNotifier, LocalTransport, LogNotifier,
    NoBuild, Notifier, SystemShell,
};
use crate::error::{Result, RolloutError};
use crate::host::{Inventory, Role};
use crate::paths;
use crate::recipe;
use crate::registry::TaskRegistry;
use crate::ssh::{SshSettings, SshTransport};
use crate::task::{Scope, Step, Task, TaskName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// The deployed application and its consensus sidecar, as seen from the
/// built-in `deploy:*` and `sidecar:*` tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Role the built-in tasks target.
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub start_args: String,
    #[serde(default = "default_reset_args")]
    pub reset_args: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<SidecarConfig>,
}

fn default_binary() -> String {
    "node".to_string()
}

fn default_role() -> String {
    "app".to_string()
}

fn default_remote_dir() -> String {
    "app".to_string()
}

fn default_data_dir() -> String {
    "app/data".to_string()
}

fn default_reset_args() -> String {
    "unsafe_reset_all".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            role: default_role(),
            remote_dir: default_remote_dir(),
            data_dir: default_data_dir(),
            start_args: String::new(),
            reset_args: default_reset_args(),
            sidecar: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SidecarConfig {
    #[serde(default = "default_sidecar_binary")]
    pub binary: String,
    #[serde(default = "default_sidecar_home")]
    pub home: String,
    #[serde(default = "default_sidecar_start_args")]
    pub start_args: String,
}

fn default_sidecar_binary() -> String {
    "tendermint".to_string()
}

fn default_sidecar_home() -> String {
    ".tendermint".to_string()
}

fn default_sidecar_start_args() -> String {
    "node".to_string()
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            binary: default_sidecar_binary(),
            home: default_sidecar_home(),
            start_args: default_sidecar_start_args(),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildConfig / NotifyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub command: String,
    /// Artifact path relative to the project root.
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Local command; the message is passed as its first argument.
    pub command: String,
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    Ssh {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity_file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connect_timeout: Option<u32>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
    /// Host commands run on this machine; uploads are file copies.
    Local,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Ssh {
            user: None,
            port: None,
            identity_file: None,
            connect_timeout: Some(10),
            options: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskConfig / EnvironmentConfig
// ---------------------------------------------------------------------------

/// A task declared in `rollout.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub name: TaskName,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_scope")]
    pub scope: Scope,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Replace an existing task of the same name instead of failing.
    #[serde(default, rename = "override", skip_serializing_if = "std::ops::Not::not")]
    pub allow_override: bool,
}

fn default_scope() -> Scope {
    Scope::Local
}

impl TaskConfig {
    pub fn to_task(&self) -> Task {
        Task {
            name: self.name.clone(),
            description: self.description.clone(),
            scope: self.scope.clone(),
            steps: self.steps.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyConfig>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            app: AppConfig::default(),
            build: None,
            transport: TransportConfig::default(),
            notify: None,
            roles: Vec::new(),
            environments: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(RolloutError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Roles for `env`, or the top-level roles when no environment is given.
    pub fn roles_for(&self, env: Option<&str>) -> Result<&[Role]> {
        match env {
            None => Ok(&self.roles),
            Some(name) => self
                .environments
                .get(name)
                .map(|e| e.roles.as_slice())
                .ok_or_else(|| RolloutError::UnknownEnvironment(name.to_string())),
        }
    }

    pub fn inventory(&self, env: Option<&str>) -> Result<Inventory> {
        Ok(Inventory::new(self.roles_for(env)?.to_vec()))
    }

    /// Built-in recipe first, then tasks from the file in declaration order.
    pub fn registry(&self) -> Result<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        recipe::register(&mut registry, &self.app)?;
        for task in &self.tasks {
            registry.register(task.to_task(), task.allow_override)?;
        }
        Ok(registry)
    }

    /// Wire the process-backed collaborators described by this config.
    pub fn collaborators(&self, root: &Path) -> Result<Collaborators> {
        let builder: Box<dyn Builder> = match &self.build {
            Some(b) => Box::new(CommandBuilder::new(root, &b.command, &b.artifact)),
            None => Box::new(NoBuild),
        };
        let notifier: Box<dyn Notifier> = match &self.notify {
            Some(n) => Box::new(CommandNotifier::new(root, &n.command)),
            None => Box::new(LogNotifier),
        };
        let local = Box::new(SystemShell::new(root));
        let collab = match &self.transport {
            TransportConfig::Local => Collaborators {
                local,
                remote: Box::new(LocalTransport::new(root)),
                transfer: Box::new(LocalTransport::new(root)),
                builder,
                notifier,
            },
            TransportConfig::Ssh {
                user,
                port,
                identity_file,
                connect_timeout,
                options,
            } => {
                let ssh = SshTransport::detect(root, SshSettings {
                    user: user.clone(),
                    port: *port,
                    identity_file: identity_file.clone(),
                    connect_timeout: *connect_timeout,
                    options: options.clone(),
                })?;
                Collaborators {
                    local,
                    remote: Box::new(ssh.clone()),
                    transfer: Box::new(ssh),
                    builder,
                    notifier,
                }
            }
        };
        Ok(collab)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Roles, top-level and per environment
        let mut role_sets: Vec<(String, &[Role])> = vec![("roles".to_string(), self.roles.as_slice())];
        for (env, cfg) in &self.environments {
            role_sets.push((format!("environments.{env}.roles"), cfg.roles.as_slice()));
        }
        for (location, roles) in &role_sets {
            let mut seen = HashSet::new();
            for role in roles.iter() {
                if !seen.insert(role.name.as_str()) {
                    warnings.push(ConfigWarning::error(format!(
                        "role '{}' declared twice in {location}",
                        role.name
                    )));
                }
                if role.hosts.is_empty() {
                    warnings.push(ConfigWarning::warning(format!(
                        "role '{}' in {location} has no hosts",
                        role.name
                    )));
                }
                let mut hosts = HashSet::new();
                for host in &role.hosts {
                    if !hosts.insert(host.name.as_str()) {
                        warnings.push(ConfigWarning::warning(format!(
                            "host '{}' listed twice in role '{}' ({location})",
                            host.name, role.name
                        )));
                    }
                }
            }
        }

        // 2. Registry: duplicates, overrides of nothing
        let mut builtin = TaskRegistry::new();
        if let Err(e) = recipe::register(&mut builtin, &self.app) {
            warnings.push(ConfigWarning::error(format!("built-in tasks: {e}")));
        }
        let mut declared: HashSet<&TaskName> = HashSet::new();
        for task in &self.tasks {
            let exists = builtin.contains(&task.name) || declared.contains(&task.name);
            if exists && !task.allow_override {
                warnings.push(ConfigWarning::error(format!(
                    "task '{}' is already defined; set 'override: true' to replace it",
                    task.name
                )));
            }
            if !exists && task.allow_override {
                warnings.push(ConfigWarning::warning(format!(
                    "task '{}' sets override but replaces nothing",
                    task.name
                )));
            }
            declared.insert(&task.name);
        }

        // 3. Scopes, invocations, steps
        let declared_role = |name: &str| {
            self.roles.iter().any(|r| r.name == name)
                || self
                    .environments
                    .values()
                    .any(|e| e.roles.iter().any(|r| r.name == name))
        };
        if !declared_role(&self.app.role) {
            warnings.push(ConfigWarning::warning(format!(
                "app.role '{}' is not declared; built-in deploy tasks cannot run",
                self.app.role
            )));
        }
        for task in &self.tasks {
            if let Scope::Role(role) = &task.scope {
                if !declared_role(role) {
                    warnings.push(ConfigWarning::error(format!(
                        "task '{}' targets undeclared role '{role}'",
                        task.name
                    )));
                }
            }
            if task.steps.is_empty() {
                warnings.push(ConfigWarning::warning(format!(
                    "task '{}' has no steps",
                    task.name
                )));
            }
            for step in &task.steps {
                match step {
                    Step::Invoke { task: target, .. }
                        if !builtin.contains(target) && !declared.contains(target) =>
                    {
                        warnings.push(ConfigWarning::error(format!(
                            "task '{}' invokes unknown task '{target}'",
                            task.name
                        )));
                    }
                    Step::Command { command, .. } if command.trim().is_empty() => {
                        warnings.push(ConfigWarning::warning(format!(
                            "task '{}' has an empty command",
                            task.name
                        )));
                    }
                    Step::Upload { .. } if task.scope == Scope::Local => {
                        warnings.push(ConfigWarning::warning(format!(
                            "task '{}' uploads from a local scope; uploads need role:<name>",
                            task.name
                        )));
                    }
                    Step::Build if task.scope != Scope::Local => {
                        warnings.push(ConfigWarning::warning(format!(
                            "task '{}' builds once per host; builds usually belong in a local task",
                            task.name
                        )));
                    }
                    _ => {}
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::task::{FailurePolicy, InvokeMode};
    use tempfile::TempDir;

    const FULL: &str = r#"
version: 1
project:
  name: chain-node
app:
  binary: node
  remote_dir: /home/deploy/node
  data_dir: /home/deploy/.node
  sidecar:
    home: /home/deploy/.tendermint
build:
  command: "go build -o build/node ./cmd/node"
  artifact: build/node
transport:
  type: ssh
  user: deploy
  port: 2222
notify:
  command: ./message.sh
roles:
  - name: app
    hosts:
      - { name: h1, address: 10.0.0.1 }
      - { name: h2, address: 10.0.0.2, user: root }
environments:
  staging:
    roles:
      - name: app
        hosts: [{ name: s1, address: 10.1.0.1 }]
tasks:
  - name: deploy:logs
    description: Tail the node log
    scope: role:app
    steps:
      - { type: command, command: "tail -n 100 node.log" }
  - name: deploy:stop
    description: Stop node and sidecar
    scope: role:app
    override: true
    steps:
      - { type: command, command: "pkill -x node; pkill -x tendermint" }
"#;

    #[test]
    fn full_config_parses() {
        let cfg: Config = serde_yaml::from_str(FULL).unwrap();
        assert_eq!(cfg.project.name, "chain-node");
        assert_eq!(cfg.app.role, "app");
        assert_eq!(cfg.app.sidecar.as_ref().unwrap().binary, "tendermint");
        assert_eq!(
            cfg.transport,
            TransportConfig::Ssh {
                user: Some("deploy".into()),
                port: Some(2222),
                identity_file: None,
                connect_timeout: None,
                options: vec![],
            }
        );
        assert_eq!(cfg.roles[0].hosts[1].user.as_deref(), Some("root"));
        assert_eq!(cfg.tasks.len(), 2);
        assert!(cfg.tasks[1].allow_override);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let yaml = "version: 1\nproject:\n  name: my-node\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.app.binary, "node");
        assert!(cfg.build.is_none());
        assert!(matches!(cfg.transport, TransportConfig::Ssh { .. }));
        assert!(cfg.roles.is_empty());

        let out = serde_yaml::to_string(&cfg).unwrap();
        assert!(!out.contains("environments"));
        assert!(!out.contains("tasks"));
    }

    #[test]
    fn local_transport_parses() {
        let yaml = "project:\n  name: x\ntransport:\n  type: local\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.transport, TransportConfig::Local);
    }

    #[test]
    fn task_config_rejects_unknown_fields() {
        let yaml = "name: deploy:x\nscope: local\noverrides: true\n";
        assert!(serde_yaml::from_str::<TaskConfig>(yaml).is_err());
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        for yaml in [
            "project:\n  name: x\napp:\n  remote_dri: /srv/node\n",
            "project:\n  name: x\napp:\n  sidecar:\n    hom: /srv/tm\n",
            "project:\n  name: x\nbuild:\n  command: make\n  artifact: out\n  artefact: out\n",
            "project:\n  name: x\nnotify:\n  cmd: ./message.sh\n",
            "project:\n  name: x\n  desc: typo\n",
            "project:\n  name: x\nenvironments:\n  staging:\n    role: []\n",
            "project:\n  name: x\nrole:\n  - name: app\n",
        ] {
            let err = serde_yaml::from_str::<Config>(yaml).unwrap_err();
            assert!(err.to_string().contains("unknown field"), "{yaml}: {err}");
        }
    }

    #[test]
    fn environment_selects_roles() {
        let cfg: Config = serde_yaml::from_str(FULL).unwrap();
        let default = cfg.inventory(None).unwrap();
        assert_eq!(default.resolve("app").unwrap().len(), 2);

        let staging = cfg.inventory(Some("staging")).unwrap();
        assert_eq!(staging.resolve("app").unwrap()[0].name, "s1");

        assert!(matches!(
            cfg.inventory(Some("prod")),
            Err(RolloutError::UnknownEnvironment(e)) if e == "prod"
        ));
    }

    #[test]
    fn registry_applies_overrides_over_builtins() {
        let cfg: Config = serde_yaml::from_str(FULL).unwrap();
        let reg = cfg.registry().unwrap();
        let stop = reg.lookup_str("deploy:stop").unwrap();
        assert_eq!(stop.steps, [Step::command("pkill -x node; pkill -x tendermint")]);
        assert!(reg.lookup_str("deploy:logs").is_ok());
        assert!(reg.lookup_str("sidecar:start").is_ok());
    }

    #[test]
    fn registry_rejects_silent_shadowing() {
        let mut cfg: Config = serde_yaml::from_str(FULL).unwrap();
        cfg.tasks[1].allow_override = false;
        assert!(matches!(
            cfg.registry(),
            Err(RolloutError::DuplicateTask(t)) if t == "deploy:stop"
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("roundtrip");
        cfg.roles.push(Role::new("app", vec![Host::new("h1", "10.0.0.1")]));
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.project.name, "roundtrip");
        assert_eq!(loaded.roles, cfg.roles);
    }

    #[test]
    fn load_without_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(RolloutError::NotInitialized)
        ));
    }

    #[test]
    fn validate_full_config_is_clean() {
        let cfg: Config = serde_yaml::from_str(FULL).unwrap();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn validate_reports_task_problems() {
        let mut cfg = Config::new("x");
        cfg.roles.push(Role::new("app", vec![]));
        cfg.tasks.push(TaskConfig {
            name: TaskName::parse("deploy:stop").unwrap(),
            description: String::new(),
            scope: Scope::role("web"),
            steps: vec![
                Step::command("  "),
                Step::invoke(
                    TaskName::parse("deploy:ghost").unwrap(),
                    InvokeMode::Always,
                    FailurePolicy::Contain,
                ),
            ],
            allow_override: false,
        });
        cfg.tasks.push(TaskConfig {
            name: TaskName::parse("deploy:fresh").unwrap(),
            description: String::new(),
            scope: Scope::Local,
            steps: vec![Step::upload("/opt/x")],
            allow_override: true,
        });
        let messages: Vec<String> = cfg.validate().into_iter().map(|w| w.message).collect();
        let has = |needle: &str| messages.iter().any(|m| m.contains(needle));
        assert!(has("role 'app' in roles has no hosts"));
        assert!(has("'deploy:stop' is already defined"));
        assert!(has("undeclared role 'web'"));
        assert!(has("empty command"));
        assert!(has("unknown task 'deploy:ghost'"));
        assert!(has("'deploy:fresh' sets override but replaces nothing"));
        assert!(has("uploads from a local scope"));
    }

    #[test]
    fn validate_duplicate_roles_and_hosts() {
        let mut cfg = Config::new("x");
        cfg.roles.push(Role::new(
            "app",
            vec![Host::new("h1", "a"), Host::new("h1", "b")],
        ));
        cfg.roles.push(Role::new("app", vec![Host::new("h2", "c")]));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| {
            w.level == WarnLevel::Error && w.message.contains("role 'app' declared twice")
        }));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("host 'h1' listed twice")));
    }

    #[test]
    fn collaborators_for_local_transport() {
        let dir = TempDir::new().unwrap();
        let yaml = "project:\n  name: x\ntransport:\n  type: local\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let collab = cfg.collaborators(dir.path()).unwrap();
        let err = collab.builder.build().unwrap_err();
        assert!(matches!(err, RolloutError::BuildFailed(_)));
    }
}
