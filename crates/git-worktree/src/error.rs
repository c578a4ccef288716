//! Error types for git-worktree operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for worktree operations
pub type Result<T> = std::result::Result<T, WorktreeError>;

/// Errors that can occur during worktree operations
#[derive(Debug, Error)]
pub enum WorktreeError {
    /// A git subprocess exited non-zero
    #[error("git {command} failed with exit code {exit_code}: {stderr}")]
    GitOperation {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The git binary could not be executed at all
    #[error("Failed to execute git: {0}")]
    GitUnavailable(#[source] std::io::Error),

    /// Branch not found
    #[error("Branch '{branch}' not found")]
    BranchNotFound { branch: String },

    /// Not a git repository
    #[error("Not a git repository: {path}")]
    NotAGitRepository { path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorktreeError {
    /// Create a GitOperation error from a failed command invocation
    pub fn git_operation(args: &[&str], exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::GitOperation {
            command: args.join(" "),
            exit_code,
            stderr: stderr.into(),
        }
    }
}
