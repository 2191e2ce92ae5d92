use anyhow::Context;
use rollout_core::{io, paths};
use std::path::Path;

const STARTER: &str = r#"version: 1
project:
  name: {name}

app:
  binary: node
  remote_dir: app
  data_dir: app/data

build:
  command: "go build -o build/node ./cmd/node"
  artifact: build/node

transport:
  type: ssh
  connect_timeout: 10

roles:
  - name: app
    hosts:
      - { name: node-1, address: 192.0.2.10 }

tasks:
  - name: deploy:logs
    description: Tail the node log
    scope: role:app
    steps:
      - { type: command, command: "tail -n 100 app/node.log" }
"#;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = match name {
        Some(n) => n.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };

    let path = paths::config_path(root);
    let body = STARTER.replace("{name}", &project_name);
    let created = io::write_if_missing(&path, body.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    if created {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }
    Ok(())
}
