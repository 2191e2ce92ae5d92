use thiserror::Error;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("not initialized: no rollout.yaml found (run 'rollout init')")]
    NotInitialized,

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role '{0}' resolves to no hosts")]
    EmptyRoleSet(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task already registered: {0} (set override: true to replace it)")]
    DuplicateTask(String),

    #[error("invalid task name '{0}': expected <namespace>:<name> in lowercase")]
    InvalidTaskName(String),

    #[error("invalid scope '{0}': expected 'local' or 'role:<name>'")]
    InvalidScope(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("cyclic invocation: {}", .0.join(" -> "))]
    CyclicInvocation(Vec<String>),

    #[error("run aborted: task '{task}' failed on {host}: `{command}`: {message}")]
    RunAborted {
        task: String,
        host: String,
        command: String,
        message: String,
    },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RolloutError {
    /// True for errors that point at a defect in task definitions or
    /// deployment config rather than an operational failure on a host.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RolloutError::NotInitialized
                | RolloutError::UnknownRole(_)
                | RolloutError::EmptyRoleSet(_)
                | RolloutError::UnknownTask(_)
                | RolloutError::DuplicateTask(_)
                | RolloutError::InvalidTaskName(_)
                | RolloutError::InvalidScope(_)
                | RolloutError::UnknownEnvironment(_)
                | RolloutError::CyclicInvocation(_)
                | RolloutError::Yaml(_)
        )
    }

    /// Process exit code for the CLI: 2 for configuration errors and cycles,
    /// 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() { 2 } else { 1 }
    }
}

pub type Result<T> = std::result::Result<T, RolloutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_shows_call_chain() {
        let err = RolloutError::CyclicInvocation(vec![
            "deploy:a".to_string(),
            "deploy:b".to_string(),
            "deploy:a".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "cyclic invocation: deploy:a -> deploy:b -> deploy:a"
        );
    }

    #[test]
    fn exit_codes_split_config_from_aborts() {
        assert_eq!(RolloutError::UnknownTask("x:y".into()).exit_code(), 2);
        assert_eq!(RolloutError::CyclicInvocation(vec![]).exit_code(), 2);
        let aborted = RolloutError::RunAborted {
            task: "deploy:upload".into(),
            host: "h1".into(),
            command: "upload".into(),
            message: "connection refused".into(),
        };
        assert!(!aborted.is_configuration());
        assert_eq!(aborted.exit_code(), 1);
    }
}
