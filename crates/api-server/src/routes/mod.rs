//! Route handlers

pub mod health;
pub mod repositories;
pub mod runners;
pub mod worktrees;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use git_worktree::WorktreeError;
use runner_supervisor::RunnerError;

/// Error payload crossing the boundary: a closed set of tagged failures,
/// never an opaque exception.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

pub type RouteError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(
    status: StatusCode,
    code: &'static str,
    error: impl Into<String>,
) -> RouteError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code,
        }),
    )
}

/// Map a supervisor failure to its boundary representation
pub fn map_runner_error(error: RunnerError) -> RouteError {
    let (status, code) = match &error {
        RunnerError::RunnerNotFound { .. } => (StatusCode::NOT_FOUND, "RUNNER_NOT_FOUND"),
        RunnerError::AlreadyRunning { .. } => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
        RunnerError::SpawnFailed { .. } => (StatusCode::BAD_GATEWAY, "SPAWN_FAILED"),
        RunnerError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
        RunnerError::TmuxUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "TMUX_UNAVAILABLE"),
        RunnerError::SessionNotFound { .. } => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
        RunnerError::Worktree(worktree) => match worktree {
            WorktreeError::GitOperation { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "GIT_OPERATION_FAILED")
            }
            WorktreeError::BranchNotFound { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "BRANCH_NOT_FOUND")
            }
            WorktreeError::NotAGitRepository { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "NOT_A_GIT_REPOSITORY")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "WORKTREE_ERROR"),
        },
        RunnerError::Core(core) => match core {
            pilot_core::Error::RepositoryNotFound(_) => {
                (StatusCode::NOT_FOUND, "REPOSITORY_NOT_FOUND")
            }
            pilot_core::Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "CORE_ERROR"),
        },
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };

    error_response(status, code, error.to_string())
}

/// Map a repository-store failure to its boundary representation
pub fn map_core_error(error: pilot_core::Error) -> RouteError {
    map_runner_error(RunnerError::Core(error))
}
