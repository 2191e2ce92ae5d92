//! Built-in deployment recipe: build, ship and drive the node binary and
//! its consensus sidecar on the app role.

use crate::config::AppConfig;
use crate::error::Result;
use crate::registry::TaskRegistry;
use crate::task::{FailurePolicy, InvokeMode, Scope, Step, Task, TaskName};

fn name(s: &str) -> Result<TaskName> {
    TaskName::parse(s)
}

fn call(task: &str, policy: FailurePolicy) -> Result<Step> {
    Ok(Step::invoke(name(task)?, InvokeMode::Always, policy))
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Background `command`, then fail unless it is still alive a second later.
fn launch(command: &str, log: &str) -> String {
    format!(
        "{command} & sleep 1; kill -0 $! 2>/dev/null || {{ echo 'exited during startup; see {log}' >&2; exit 1; }}"
    )
}

/// Every built-in task for `app`, in registration order.
pub fn tasks(app: &AppConfig) -> Result<Vec<Task>> {
    use FailurePolicy::{Contain, HardFail};

    let role = Scope::role(&app.role);
    let bin = &app.binary;
    let dir = &app.remote_dir;

    let mut tasks = vec![
        Task::new(name("deploy:build")?, "Build the release binary locally", Scope::Local)
            .step(Step::Build),
        Task::new(name("deploy:setup")?, "Create remote directories", role.clone())
            .step(Step::command(format!("mkdir -p {dir} {}", app.data_dir))),
        Task::new(name("deploy:upload")?, "Upload the built binary", role.clone())
            .step(Step::upload(format!("{dir}/{bin}"))),
        Task::new(name("deploy:stop")?, "Stop the node", role.clone())
            .step(Step::command(format!("pkill -x {bin}"))),
        Task::new(name("deploy:start")?, "Start the node in the background", role.clone())
            .step(Step::pty(launch(
                &format!(
                    "cd {dir} && {} > {bin}.log 2>&1",
                    join(&["nohup", &format!("./{bin}"), &app.start_args])
                ),
                &format!("{dir}/{bin}.log"),
            ))),
        Task::new(name("deploy:reset")?, "Wipe node state", role.clone())
            .step(Step::command(join(&[&format!("{dir}/{bin}"), &app.reset_args]))),
        Task::new(name("deploy:uptime")?, "Report host uptime", role.clone())
            .step(Step::command("uptime"))
            .step(Step::notify("uptime checked on {host}")),
        Task::new(name("deploy:restart")?, "Stop then start the node", Scope::Local)
            .step(call("deploy:stop", Contain)?)
            .step(call("deploy:start", HardFail)?),
        Task::new(
            name("deploy:update")?,
            "Rebuild and redeploy without touching state",
            Scope::Local,
        )
        .step(call("deploy:build", HardFail)?)
        .step(call("deploy:stop", Contain)?)
        .step(call("deploy:upload", HardFail)?)
        .step(call("deploy:start", HardFail)?)
        .step(Step::notify("update finished (run {run_id})")),
        Task::new(
            name("deploy:full_reset")?,
            "Rebuild, redeploy and wipe node state",
            Scope::Local,
        )
        .step(call("deploy:build", HardFail)?)
        .step(call("deploy:stop", Contain)?)
        .step(call("deploy:upload", HardFail)?)
        .step(call("deploy:reset", Contain)?)
        .step(call("deploy:start", HardFail)?)
        .step(Step::notify("full reset finished (run {run_id})")),
    ];

    if let Some(sidecar) = &app.sidecar {
        let sbin = &sidecar.binary;
        let home = &sidecar.home;
        tasks.push(
            Task::new(name("sidecar:start")?, "Start the consensus sidecar", role.clone())
                .step(Step::pty(launch(
                    &format!(
                        "{} --home {home} > {sbin}.log 2>&1",
                        join(&["nohup", sbin, &sidecar.start_args])
                    ),
                    &format!("{sbin}.log"),
                ))),
        );
        tasks.push(
            Task::new(name("sidecar:stop")?, "Stop the consensus sidecar", role.clone())
                .step(Step::command(format!("pkill -x {sbin}"))),
        );
        tasks.push(
            Task::new(name("sidecar:reset")?, "Wipe consensus state", role.clone())
                .step(Step::command(format!("{sbin} unsafe_reset_all --home {home}"))),
        );
        tasks.push(
            Task::new(name("sidecar:restart")?, "Stop then start the sidecar", Scope::Local)
                .step(call("sidecar:stop", Contain)?)
                .step(call("sidecar:start", HardFail)?),
        );
    }

    Ok(tasks)
}

/// Register the built-in tasks. Fails if any of them already exists.
pub fn register(registry: &mut TaskRegistry, app: &AppConfig) -> Result<()> {
    for task in tasks(app)? {
        registry.register(task, false)?;
    }
    Ok(())
}
