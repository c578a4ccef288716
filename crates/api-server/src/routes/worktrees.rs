//! Worktree provisioning endpoints

use std::path::PathBuf;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use git_worktree::WorktreeResult;

use crate::state::AppState;

use super::{map_runner_error, RouteError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorktreeRequest {
    pub repository_id: Uuid,
    pub issue_number: u64,
    #[serde(default)]
    pub base_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveWorktreeRequest {
    pub repository_id: Uuid,
    pub worktree_path: PathBuf,
}

/// POST /api/worktrees/issue - Ensure the worktree for an issue exists
async fn create_worktree_for_issue(
    State(state): State<AppState>,
    Json(request): Json<CreateWorktreeRequest>,
) -> Result<Json<WorktreeResult>, RouteError> {
    let result = state
        .supervisor()
        .create_worktree_for_issue(
            request.repository_id,
            request.issue_number,
            request.base_branch.as_deref(),
        )
        .await
        .map_err(map_runner_error)?;
    Ok(Json(result))
}

/// DELETE /api/worktrees - Remove a worktree checkout (idempotent)
async fn remove_worktree(
    State(state): State<AppState>,
    Json(request): Json<RemoveWorktreeRequest>,
) -> Result<StatusCode, RouteError> {
    state
        .supervisor()
        .remove_worktree(request.repository_id, &request.worktree_path)
        .await
        .map_err(map_runner_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/worktrees/issue", post(create_worktree_for_issue))
        .route("/api/worktrees", delete(remove_worktree))
}
