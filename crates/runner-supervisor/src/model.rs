//! Runner domain model

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pilot_core::AgentType;

use crate::error::{Result, RunnerError};

/// How the underlying OS resource came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// A child process spawned by the supervisor
    Spawned,
    /// A pre-existing tmux session the supervisor attached to
    Attached,
}

/// Identifies the underlying OS resource of a runner.
///
/// Owned exclusively by one adapter instance for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    pub id: Uuid,
    pub pid: Option<u32>,
    pub kind: ProcessKind,
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn new(kind: ProcessKind, pid: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid,
            kind,
            started_at: Utc::now(),
        }
    }
}

/// Issue the runner was launched for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueContext {
    pub repository_id: Uuid,
    pub issue_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Immutable creation parameters for a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    pub agent_type: AgentType,
    #[serde(default)]
    pub name: Option<String>,
    pub working_directory: PathBuf,
    /// Explicit command line; required for `AgentType::Custom`
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(default)]
    pub issue_context: Option<IssueContext>,
    /// When set, the runner attaches to this tmux session instead of
    /// spawning a process
    #[serde(default)]
    pub tmux_session: Option<String>,
}

impl RunnerConfig {
    /// Resolve the command line to launch: the explicit override wins,
    /// otherwise the agent type's executable with its default arguments.
    pub fn resolved_command(&self) -> Result<(String, Vec<String>)> {
        if let Some(command) = &self.command {
            return Ok((command.clone(), self.args.clone()));
        }

        let command = self.agent_type.command().ok_or_else(|| {
            RunnerError::spawn_failed("A custom runner requires an explicit command")
        })?;

        let mut args: Vec<String> = self
            .agent_type
            .default_args()
            .into_iter()
            .map(str::to_string)
            .collect();
        args.extend(self.args.iter().cloned());

        Ok((command.to_string(), args))
    }
}

/// Lifecycle state of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    /// Adapter is being constructed; no output observed yet
    Starting,
    /// Output observed recently
    Running,
    /// No output for at least the idle threshold
    Idle,
    /// Explicitly stopped, or exited cleanly
    Stopped,
    /// Abnormal exit or spawn failure
    Errored,
}

impl RunnerStatus {
    /// Terminal states require an explicit start/restart to leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Errored)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// The aggregate the registry owns for one tracked runner.
///
/// Mutated only through registry-mediated transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRunner {
    pub id: Uuid,
    pub name: String,
    pub agent_type: AgentType,
    pub handle: ProcessHandle,
    pub status: RunnerStatus,
    pub config: RunnerConfig,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_config(command: Option<&str>) -> RunnerConfig {
        RunnerConfig {
            agent_type: AgentType::Custom,
            name: None,
            working_directory: PathBuf::from("."),
            command: command.map(str::to_string),
            args: vec!["-c".to_string(), "echo hi".to_string()],
            env: vec![],
            issue_context: None,
            tmux_session: None,
        }
    }

    #[test]
    fn test_resolved_command_uses_override() {
        let config = custom_config(Some("bash"));
        let (command, args) = config.resolved_command().unwrap();
        assert_eq!(command, "bash");
        assert_eq!(args, vec!["-c", "echo hi"]);
    }

    #[test]
    fn test_custom_without_command_fails() {
        let config = custom_config(None);
        assert!(matches!(
            config.resolved_command(),
            Err(RunnerError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn test_agent_command_gets_extra_args() {
        let config = RunnerConfig {
            agent_type: AgentType::ClaudeCode,
            command: None,
            ..custom_config(None)
        };
        let (command, args) = config.resolved_command().unwrap();
        assert_eq!(command, "claude");
        assert!(args.ends_with(&["-c".to_string(), "echo hi".to_string()]));
    }

    #[test]
    fn test_status_terminality() {
        assert!(RunnerStatus::Stopped.is_terminal());
        assert!(RunnerStatus::Errored.is_terminal());
        assert!(RunnerStatus::Starting.is_active());
        assert!(RunnerStatus::Running.is_active());
        assert!(RunnerStatus::Idle.is_active());
    }
}
