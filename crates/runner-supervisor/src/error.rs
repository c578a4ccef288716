//! Error types for runner supervision

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while supervising runners
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Worktree provisioning failed
    #[error("Worktree error: {0}")]
    Worktree(#[from] git_worktree::WorktreeError),

    /// Core domain error (repository registry, agent types)
    #[error("Core error: {0}")]
    Core(#[from] pilot_core::Error),

    /// Failed to spawn the agent process
    #[error("Failed to spawn agent process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The operating system rejected the operation
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Operation on an unknown runner id
    #[error("Runner not found: {id}")]
    RunnerNotFound { id: Uuid },

    /// Start called on a runner that is not stopped
    #[error("Runner {id} is already running")]
    AlreadyRunning { id: Uuid },

    /// tmux binary not available on this host
    #[error("tmux is not available on this host")]
    TmuxUnavailable,

    /// The named tmux session does not exist
    #[error("tmux session not found: {name}")]
    SessionNotFound { name: String },

    /// Adapter-level failure (write/resize/tmux command)
    #[error("Adapter error: {message}")]
    Adapter { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Create a SpawnFailed error
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an Adapter error
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
        }
    }

    /// Classify a spawn failure, recognizing OS-level permission rejections.
    pub fn from_spawn_error(command: &str, error: anyhow::Error) -> Self {
        if let Some(io) = error.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::PermissionDenied {
                return Self::PermissionDenied {
                    message: format!("{}: {}", command, io),
                };
            }
        }
        Self::SpawnFailed {
            message: format!("Failed to spawn {}: {}", command, error),
            source: None,
        }
    }
}
