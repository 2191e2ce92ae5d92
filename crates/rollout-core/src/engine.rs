//! Invocation engine.
//!
//! Resolves task names against a [`TaskRegistry`], expands each task's scope
//! into execution contexts, and runs bodies step by step. Execution is
//! strictly sequential: hosts in role order, steps in declaration order,
//! nested invocations inline.
//!
//! # Failure handling
//! Every command-like step produces an [`Outcome`]. Under
//! [`FailurePolicy::Contain`] a failed step is logged as a warning and the body
//! carries on; under [`FailurePolicy::HardFail`] the first failure aborts the
//! whole Run with [`RolloutError::RunAborted`]. Configuration errors (unknown
//! task or role, empty role, cycles) are always fatal.

use crate::collab::Collaborators;
use crate::context::{ExecOptions, ExecutionContext};
use crate::error::{Result, RolloutError};
use crate::host::Inventory;
use crate::registry::TaskRegistry;
use crate::run::{Outcome, Run, RunReport};
use crate::task::{FailurePolicy, InvokeMode, Scope, Step, Task, TaskName};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One node of the static call graph reachable from a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub depth: usize,
    pub task: String,
    pub description: String,
    pub scope: String,
    pub hosts: Vec<String>,
    pub mode: InvokeMode,
    pub policy: FailurePolicy,
    /// Already expanded earlier in the plan; children are not repeated.
    pub repeat: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<'a> {
    registry: &'a TaskRegistry,
    inventory: &'a Inventory,
    collab: &'a Collaborators,
}

impl<'a> Engine<'a> {
    pub fn new(
        registry: &'a TaskRegistry,
        inventory: &'a Inventory,
        collab: &'a Collaborators,
    ) -> Self {
        Self {
            registry,
            inventory,
            collab,
        }
    }

    /// Run `name` as a fresh top-level Run.
    ///
    /// The reachable call graph is checked first, so an unknown task or role
    /// anywhere in it fails before a single command runs. An aborted run is
    /// returned as a report with status `Aborted`; only configuration errors
    /// come back as `Err`.
    pub fn execute(&self, name: &TaskName, policy: FailurePolicy) -> Result<RunReport> {
        Self::plan(self.registry, self.inventory, name, policy)?;
        let mut run = Run::new();
        tracing::info!(run_id = %run.id(), task = %name, %policy, "run started");
        match self.invoke(&mut run, name, InvokeMode::Always, policy) {
            Ok(()) => {
                let report = run.into_report(name, None);
                tracing::info!(status = %report.status, outcomes = report.outcomes.len(), "run finished");
                Ok(report)
            }
            Err(err @ RolloutError::RunAborted { .. }) => {
                tracing::error!(error = %err, "run aborted");
                Ok(run.into_report(name, Some(err.to_string())))
            }
            Err(err) => Err(err),
        }
    }

    /// Invoke `name` inside an existing Run.
    ///
    /// The name is added to the Run's invoked-set before the body starts, so
    /// a body that fails still counts as run for later `once` invocations.
    pub fn invoke(
        &self,
        run: &mut Run,
        name: &TaskName,
        mode: InvokeMode,
        policy: FailurePolicy,
    ) -> Result<()> {
        let task = self.registry.lookup(name)?;
        if mode == InvokeMode::Once && run.has_invoked(name) {
            tracing::debug!(task = %name, "already invoked; skipping");
            return Ok(());
        }
        run.enter(name)?;
        run.mark_invoked(name);
        let result = self.run_body(run, task, policy);
        run.leave();
        result
    }

    fn run_body(&self, run: &mut Run, task: &Task, policy: FailurePolicy) -> Result<()> {
        let contexts: Vec<ExecutionContext<'_>> = match &task.scope {
            Scope::Local => vec![ExecutionContext::Local],
            Scope::Role(role) => self
                .inventory
                .resolve(role)?
                .iter()
                .map(ExecutionContext::Remote)
                .collect(),
        };
        tracing::info!(task = %task.name, scope = %task.scope, contexts = contexts.len(), "invoking");
        for ctx in &contexts {
            for step in &task.steps {
                self.run_step(run, task, ctx, step, policy)?;
            }
        }
        Ok(())
    }

    fn run_step(
        &self,
        run: &mut Run,
        task: &Task,
        ctx: &ExecutionContext<'_>,
        step: &Step,
        policy: FailurePolicy,
    ) -> Result<()> {
        match step {
            Step::Command { command, pty } => {
                let command = expand(command, ctx, run);
                let (success, message) =
                    match ctx.run(self.collab, &command, ExecOptions { pty: *pty }) {
                        Ok(result) => (result.success(), result.message()),
                        Err(err) => (false, err.to_string()),
                    };
                self.settle(run, task, ctx, command, success, message, policy)
            }
            Step::Invoke {
                task: nested,
                mode,
                policy: nested_policy,
            } => self.invoke(run, nested, *mode, *nested_policy),
            Step::Build => {
                let built = match ctx.host() {
                    Some(_) => Err("build needs a local task".to_string()),
                    None => self.collab.builder.build().map_err(|err| err.to_string()),
                };
                let (success, message) = match built {
                    Ok(out) => {
                        if out.success {
                            run.set_artifact(out.artifact);
                        }
                        (out.success, out.message)
                    }
                    Err(message) => (false, message),
                };
                self.settle(run, task, ctx, step.label(), success, message, policy)
            }
            Step::Upload {
                remote_path,
                local_path,
            } => {
                let remote_path = expand(remote_path, ctx, run);
                let source = local_path
                    .clone()
                    .or_else(|| run.artifact().map(Path::to_path_buf));
                let label = format!("upload {remote_path}");
                let (success, message) = match (ctx.host(), source) {
                    (None, _) => (false, "upload needs a role-scoped task".to_string()),
                    (_, None) => (false, "no artifact to upload; run a build step first".to_string()),
                    (Some(host), Some(src)) => {
                        match self.collab.transfer.upload(&src, host, &remote_path) {
                            Ok(()) => (true, format!("uploaded {}", src.display())),
                            Err(err) => (false, err.to_string()),
                        }
                    }
                };
                self.settle(run, task, ctx, label, success, message, policy)
            }
            Step::Notify { message } => {
                let message = expand(message, ctx, run);
                if let Err(err) = self.collab.notifier.notify(&message) {
                    tracing::warn!(task = %task.name, error = %err, "notification failed");
                }
                Ok(())
            }
        }
    }

    /// Record the outcome of a step and apply the failure policy.
    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        run: &mut Run,
        task: &Task,
        ctx: &ExecutionContext<'_>,
        command: String,
        success: bool,
        message: String,
        policy: FailurePolicy,
    ) -> Result<()> {
        let host = ctx.label().to_string();
        run.record(Outcome {
            task: task.name.to_string(),
            host: host.clone(),
            command: command.clone(),
            success,
            message: message.clone(),
            at: Utc::now(),
        });
        if success {
            tracing::debug!(task = %task.name, %host, %command, "step ok");
            return Ok(());
        }
        match policy {
            FailurePolicy::Contain => {
                tracing::warn!(task = %task.name, %host, %command, %message, "step failed; continuing");
                Ok(())
            }
            FailurePolicy::HardFail => {
                run.mark_aborted();
                Err(RolloutError::RunAborted {
                    task: task.name.to_string(),
                    host,
                    command,
                    message,
                })
            }
        }
    }

    /// Walk the static call graph from `name` without running anything.
    ///
    /// Fails on the first unknown task, unknown role or empty role, and on
    /// any cycle closed by an `always` edge. A `once` edge back onto the
    /// call stack is legal: that task is already invoked, so the call is a
    /// no-op at run time.
    pub fn plan(
        registry: &TaskRegistry,
        inventory: &Inventory,
        name: &TaskName,
        policy: FailurePolicy,
    ) -> Result<Vec<PlanEntry>> {
        let mut walk = PlanWalk {
            registry,
            inventory,
            expanded: HashSet::new(),
            stack: Vec::new(),
            entries: Vec::new(),
        };
        walk.node(name, 0, InvokeMode::Always, policy)?;
        Ok(walk.entries)
    }
}

struct PlanWalk<'a> {
    registry: &'a TaskRegistry,
    inventory: &'a Inventory,
    expanded: HashSet<TaskName>,
    /// Tasks on the current path, outermost first.
    stack: Vec<TaskName>,
    entries: Vec<PlanEntry>,
}

impl PlanWalk<'_> {
    fn node(
        &mut self,
        name: &TaskName,
        depth: usize,
        mode: InvokeMode,
        policy: FailurePolicy,
    ) -> Result<()> {
        let on_stack = self.stack.contains(name);
        if on_stack && mode == InvokeMode::Always {
            let mut chain: Vec<String> = self.stack.iter().map(|n| n.to_string()).collect();
            chain.push(name.to_string());
            return Err(RolloutError::CyclicInvocation(chain));
        }
        let task = self.registry.lookup(name)?;
        let hosts = match &task.scope {
            Scope::Local => Vec::new(),
            Scope::Role(role) => self
                .inventory
                .resolve(role)?
                .iter()
                .map(|h| h.name.clone())
                .collect(),
        };
        let repeat = !self.expanded.insert(name.clone()) || on_stack;
        self.entries.push(PlanEntry {
            depth,
            task: name.to_string(),
            description: task.description.clone(),
            scope: task.scope.to_string(),
            hosts,
            mode,
            policy,
            repeat,
        });
        if repeat {
            return Ok(());
        }
        self.stack.push(name.clone());
        for step in &task.steps {
            if let Step::Invoke {
                task: nested,
                mode,
                policy,
            } = step
            {
                self.node(nested, depth + 1, *mode, *policy)?;
            }
        }
        self.stack.pop();
        Ok(())
    }
}

/// Substitute `{host}`, `{address}` and `{run_id}` for the current context.
fn expand(template: &str, ctx: &ExecutionContext<'_>, run: &Run) -> String {
    let (host, address) = match ctx.host() {
        Some(h) => (h.name.as_str(), h.address.as_str()),
        None => ("local", "127.0.0.1"),
    };
    template
        .replace("{host}", host)
        .replace("{address}", address)
        .replace("{run_id}", &run.id().to_string())
}
