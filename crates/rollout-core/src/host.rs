//! Hosts, roles, and the resolver that maps a role name to its hosts.
//!
//! Role declaration order and host order within a role are preserved: every
//! role-scoped task walks its hosts in exactly the order they were declared.

use crate::error::{Result, RolloutError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Host {
    /// Short label used in logs and the outcome log (e.g. "h1").
    pub name: String,
    /// Hostname or IP the transport connects to.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            user: None,
            port: None,
            identity_file: None,
        }
    }

    /// `user@address` when a user is set, otherwise the bare address.
    pub fn destination(&self, default_user: Option<&str>) -> String {
        match self.user.as_deref().or(default_user) {
            Some(user) => format!("{user}@{}", self.address),
            None => self.address.clone(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

impl Role {
    pub fn new(name: impl Into<String>, hosts: Vec<Host>) -> Self {
        Self {
            name: name.into(),
            hosts,
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Read-only role → hosts table, built once per process.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    roles: Vec<Role>,
}

impl Inventory {
    pub fn new(roles: Vec<Role>) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_declared(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.name == role)
    }

    /// Hosts of `role` in declaration order.
    ///
    /// A declared role with no hosts is an error, never an empty slice.
    pub fn resolve(&self, role: &str) -> Result<&[Host]> {
        let declared = self
            .roles
            .iter()
            .find(|r| r.name == role)
            .ok_or_else(|| RolloutError::UnknownRole(role.to_string()))?;
        if declared.hosts.is_empty() {
            return Err(RolloutError::EmptyRoleSet(role.to_string()));
        }
        Ok(&declared.hosts)
    }

    /// Keep hosts only in the named roles. Other roles stay declared but
    /// empty, so tasks targeting them fail with `EmptyRoleSet`.
    pub fn retain_roles(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        for role in &mut self.roles {
            if !names.contains(&role.name) {
                role.hosts.clear();
            }
        }
    }

    /// Keep only hosts whose name or address is listed.
    pub fn retain_hosts(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        for role in &mut self.roles {
            role.hosts
                .retain(|h| names.contains(&h.name) || names.contains(&h.address));
        }
    }
}
