//! Task registry: the set of named tasks an engine can invoke.
//!
//! Built once per process and read-only afterwards. Replacing an existing
//! task requires an explicit override flag.

use crate::error::{Result, RolloutError};
use crate::task::{Task, TaskName};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskName, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `task`. An existing task with the same name is an error unless
    /// `allow_override` is set, in which case it is replaced and returned.
    pub fn register(&mut self, task: Task, allow_override: bool) -> Result<Option<Task>> {
        if self.tasks.contains_key(&task.name) {
            if !allow_override {
                return Err(RolloutError::DuplicateTask(task.name.to_string()));
            }
            tracing::warn!(task = %task.name, "task definition overridden; previous definition replaced");
        }
        Ok(self.tasks.insert(task.name.clone(), task))
    }

    pub fn lookup(&self, name: &TaskName) -> Result<&Task> {
        self.tasks
            .get(name)
            .ok_or_else(|| RolloutError::UnknownTask(name.to_string()))
    }

    /// Look up by raw string; malformed names report as unknown tasks.
    pub fn lookup_str(&self, name: &str) -> Result<&Task> {
        let parsed =
            TaskName::parse(name).map_err(|_| RolloutError::UnknownTask(name.to_string()))?;
        self.lookup(&parsed)
    }

    pub fn contains(&self, name: &TaskName) -> bool {
        self.tasks.contains_key(name)
    }

    /// All tasks, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
