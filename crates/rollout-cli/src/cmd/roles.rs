use super::{load, Target};
use crate::output::{print_json, print_table};
use std::path::Path;

pub fn list(root: &Path, target: &Target, json: bool) -> anyhow::Result<()> {
    let loaded = load(root, target)?;
    let roles = loaded.inventory.roles();

    if json {
        return print_json(&roles);
    }

    let mut rows = Vec::new();
    for role in roles {
        if role.hosts.is_empty() {
            rows.push(vec![role.name.clone(), "-".to_string(), String::new()]);
        }
        for host in &role.hosts {
            rows.push(vec![role.name.clone(), host.name.clone(), host.address.clone()]);
        }
    }
    print_table(&["ROLE", "HOST", "ADDRESS"], rows);
    Ok(())
}
