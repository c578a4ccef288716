//! Repository registry endpoints
//!
//! The resolver surface callers use to obtain a `repositoryId` before
//! provisioning worktrees or launching runners.

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use pilot_core::{CreateRepositoryRequest, Repository};

use crate::state::AppState;

use super::{map_core_error, RouteError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryListResponse {
    pub repositories: Vec<Repository>,
}

/// POST /api/repositories - Register a local clone
async fn register_repository(
    State(state): State<AppState>,
    Json(request): Json<CreateRepositoryRequest>,
) -> Result<(StatusCode, Json<Repository>), RouteError> {
    let repository = state
        .supervisor()
        .repositories()
        .register(request)
        .await
        .map_err(map_core_error)?;
    Ok((StatusCode::CREATED, Json(repository)))
}

/// GET /api/repositories - List registered repositories
async fn list_repositories(State(state): State<AppState>) -> Json<RepositoryListResponse> {
    Json(RepositoryListResponse {
        repositories: state.supervisor().repositories().list().await,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/repositories",
        get(list_repositories).post(register_repository),
    )
}
