use super::{load, Target};
use crate::output::{print_json, print_table};
use rollout_core::task::{FailurePolicy, Step, TaskName};
use rollout_core::Engine;
use std::path::Path;

pub fn list(root: &Path, target: &Target, json: bool) -> anyhow::Result<()> {
    let loaded = load(root, target)?;

    if json {
        let items: Vec<serde_json::Value> = loaded
            .registry
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "scope": t.scope,
                })
            })
            .collect();
        return print_json(&items);
    }

    let rows: Vec<Vec<String>> = loaded
        .registry
        .iter()
        .map(|t| vec![t.name.to_string(), t.scope.to_string(), t.description.clone()])
        .collect();
    print_table(&["TASK", "SCOPE", "DESCRIPTION"], rows);
    Ok(())
}

pub fn show(root: &Path, target: &Target, task: &str, json: bool) -> anyhow::Result<()> {
    let loaded = load(root, target)?;
    let task = loaded.registry.lookup_str(task)?;

    if json {
        return print_json(task);
    }

    println!("{}  [{}]", task.name, task.scope);
    if !task.description.is_empty() {
        println!("  {}", task.description);
    }
    for (i, step) in task.steps.iter().enumerate() {
        let detail = match step {
            Step::Command { command, pty: true } => format!("run (pty): {command}"),
            Step::Command { command, .. } => format!("run: {command}"),
            Step::Invoke { task, mode, policy } => format!("invoke {task} ({mode}, {policy})"),
            Step::Build => "build artifact".to_string(),
            Step::Upload {
                remote_path,
                local_path: Some(local),
            } => format!("upload {} -> {remote_path}", local.display()),
            Step::Upload { remote_path, .. } => format!("upload artifact -> {remote_path}"),
            Step::Notify { message } => format!("notify: {message}"),
        };
        println!("  {}. {detail}", i + 1);
    }
    Ok(())
}

/// Print the call graph `task` would walk, checking every task and role on
/// the way. Nothing is executed.
pub fn plan(
    root: &Path,
    target: &Target,
    task: &str,
    hard_fail: bool,
    json: bool,
) -> anyhow::Result<()> {
    let name = TaskName::parse(task)?;
    let loaded = load(root, target)?;
    let policy = if hard_fail {
        FailurePolicy::HardFail
    } else {
        FailurePolicy::Contain
    };
    let entries = Engine::plan(&loaded.registry, &loaded.inventory, &name, policy)?;

    if json {
        return print_json(&entries);
    }

    for e in &entries {
        let indent = "  ".repeat(e.depth);
        let hosts = if e.hosts.is_empty() {
            "local".to_string()
        } else {
            e.hosts.join(", ")
        };
        let repeat = if e.repeat { "  (see above)" } else { "" };
        println!(
            "{indent}{}  [{}, {}] on {hosts}{repeat}",
            e.task, e.mode, e.policy
        );
    }
    Ok(())
}
