use super::{load, Target};
use crate::output::{print_json, print_table};
use anyhow::Context;
use rollout_core::run::{RunReport, RunStatus};
use rollout_core::task::{FailurePolicy, TaskName};
use rollout_core::Engine;
use std::path::Path;

pub fn run(
    root: &Path,
    target: &Target,
    task: &str,
    hard_fail: bool,
    json: bool,
) -> anyhow::Result<()> {
    let name = TaskName::parse(task)?;
    let loaded = load(root, target)?;
    let collab = loaded
        .config
        .collaborators(root)
        .context("failed to set up transport")?;
    let policy = if hard_fail {
        FailurePolicy::HardFail
    } else {
        FailurePolicy::Contain
    };

    let engine = Engine::new(&loaded.registry, &loaded.inventory, &collab);
    let report = engine.execute(&name, policy)?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.status == RunStatus::Aborted {
        anyhow::bail!(
            "{}",
            report.error.as_deref().unwrap_or("run aborted")
        );
    }
    Ok(())
}

/// Parse `<task> [--hard-fail]` given directly as `rollout <task>`.
pub fn run_external(
    root: &Path,
    target: &Target,
    args: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let Some((task, rest)) = args.split_first() else {
        anyhow::bail!("no task given; run 'rollout tasks' to list them");
    };
    let mut hard_fail = false;
    for arg in rest {
        match arg.as_str() {
            "--hard-fail" => hard_fail = true,
            other => anyhow::bail!("unexpected argument '{other}' for task '{task}'"),
        }
    }
    run(root, target, task, hard_fail, json)
}

fn print_report(report: &RunReport) {
    println!("run {} ({})", report.id, report.task);
    if !report.outcomes.is_empty() {
        let rows: Vec<Vec<String>> = report
            .outcomes
            .iter()
            .map(|o| {
                vec![
                    if o.success { "ok" } else { "FAIL" }.to_string(),
                    o.host.clone(),
                    o.task.clone(),
                    o.command.clone(),
                    o.message.clone(),
                ]
            })
            .collect();
        print_table(&["", "HOST", "TASK", "COMMAND", "MESSAGE"], rows);
    }
    if report.status == RunStatus::SuccessWithWarnings {
        let warnings: Vec<_> = report.warnings().collect();
        for w in &warnings {
            eprintln!("warning: {} on {}: {}", w.task, w.host, w.message);
        }
        println!("status: {} ({} warning(s))", report.status, warnings.len());
    } else {
        println!("status: {}", report.status);
    }
}
