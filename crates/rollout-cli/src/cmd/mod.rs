pub mod config;
pub mod init;
pub mod roles;
pub mod run;
pub mod tasks;

use anyhow::Context;
use rollout_core::config::Config;
use rollout_core::host::Inventory;
use rollout_core::registry::TaskRegistry;
use std::path::Path;

/// Host selection flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub env: Option<String>,
    pub roles: Vec<String>,
    pub hosts: Vec<String>,
}

/// Config, filtered inventory and task registry for `root`.
pub struct Loaded {
    pub config: Config,
    pub inventory: Inventory,
    pub registry: TaskRegistry,
}

pub fn load(root: &Path, target: &Target) -> anyhow::Result<Loaded> {
    let config = Config::load(root).context("failed to load rollout.yaml")?;
    let mut inventory = config
        .inventory(target.env.as_deref())
        .context("failed to resolve roles")?;
    inventory.retain_roles(&target.roles);
    inventory.retain_hosts(&target.hosts);
    let registry = config.registry().context("failed to register tasks")?;
    tracing::debug!(
        tasks = registry.len(),
        roles = inventory.roles().len(),
        "configuration loaded"
    );
    Ok(Loaded {
        config,
        inventory,
        registry,
    })
}
