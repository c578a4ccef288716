//! Runner API endpoints
//!
//! RESTful surface over the supervisor's runner operations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use runner_supervisor::{
    LaunchRequest, LogEntry, ProcessRunner, RunnerConfig, TmuxSessionInfo,
};

use crate::state::AppState;

use super::{map_runner_error, RouteError};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachTmuxRequest {
    pub session_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRequest {
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    pub rows: u16,
    pub cols: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerListResponse {
    pub runners: Vec<ProcessRunner>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TmuxSessionListResponse {
    pub sessions: Vec<TmuxSessionInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/runners - Create a runner from explicit parameters
async fn create_runner(
    State(state): State<AppState>,
    Json(config): Json<RunnerConfig>,
) -> Result<(StatusCode, Json<ProcessRunner>), RouteError> {
    let runner = state
        .supervisor()
        .create(config)
        .await
        .map_err(map_runner_error)?;
    Ok((StatusCode::CREATED, Json(runner)))
}

/// POST /api/runners/launch - Provision the issue worktree and launch there
async fn launch_runner(
    State(state): State<AppState>,
    Json(request): Json<LaunchRequest>,
) -> Result<(StatusCode, Json<ProcessRunner>), RouteError> {
    let runner = state
        .supervisor()
        .launch_for_issue(request)
        .await
        .map_err(map_runner_error)?;
    Ok((StatusCode::CREATED, Json(runner)))
}

/// GET /api/runners - List all tracked runners
async fn list_runners(State(state): State<AppState>) -> Json<RunnerListResponse> {
    Json(RunnerListResponse {
        runners: state.supervisor().list().await,
    })
}

/// GET /api/runners/:id - Fetch one runner
async fn get_runner(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProcessRunner>, RouteError> {
    let runner = state.supervisor().get(id).await.map_err(map_runner_error)?;
    Ok(Json(runner))
}

/// POST /api/runners/:id/start - Start a stopped runner
async fn start_runner(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProcessRunner>, RouteError> {
    let runner = state
        .supervisor()
        .start(id)
        .await
        .map_err(map_runner_error)?;
    Ok(Json(runner))
}

/// POST /api/runners/:id/stop - Stop a runner
async fn stop_runner(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RouteError> {
    state.supervisor().stop(id).await.map_err(map_runner_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/runners/:id/restart - Stop (if needed) and relaunch
async fn restart_runner(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProcessRunner>, RouteError> {
    let runner = state
        .supervisor()
        .restart(id)
        .await
        .map_err(map_runner_error)?;
    Ok(Json(runner))
}

/// POST /api/runners/:id/input - Send input bytes to the runner
async fn write_runner(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<InputRequest>,
) -> Result<StatusCode, RouteError> {
    state
        .supervisor()
        .write(id, request.data.as_bytes())
        .await
        .map_err(map_runner_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/runners/:id/resize - Resize the runner's terminal
async fn resize_runner(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResizeRequest>,
) -> Result<StatusCode, RouteError> {
    state
        .supervisor()
        .resize(id, request.rows, request.cols)
        .await
        .map_err(map_runner_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/runners/:id/logs - Persisted output, trailing `limit` entries
async fn runner_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, RouteError> {
    let entries = state
        .supervisor()
        .get_logs(id, query.limit)
        .await
        .map_err(map_runner_error)?;
    Ok(Json(LogsResponse { entries }))
}

/// POST /api/runners/kill-all - Terminate every runner and clear all state
async fn kill_all(State(state): State<AppState>) -> StatusCode {
    state.supervisor().kill_all().await;
    StatusCode::NO_CONTENT
}

/// POST /api/runners/attach-tmux - Track an existing tmux session
async fn attach_tmux(
    State(state): State<AppState>,
    Json(request): Json<AttachTmuxRequest>,
) -> Result<(StatusCode, Json<ProcessRunner>), RouteError> {
    let runner = state
        .supervisor()
        .attach_tmux(&request.session_name)
        .await
        .map_err(map_runner_error)?;
    Ok((StatusCode::CREATED, Json(runner)))
}

/// GET /api/tmux/sessions - Sessions on the local tmux server
async fn list_tmux_sessions(
    State(state): State<AppState>,
) -> Result<Json<TmuxSessionListResponse>, RouteError> {
    let sessions = state
        .supervisor()
        .list_tmux_sessions()
        .await
        .map_err(map_runner_error)?;
    Ok(Json(TmuxSessionListResponse { sessions }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/runners", get(list_runners).post(create_runner))
        .route("/api/runners/launch", post(launch_runner))
        .route("/api/runners/kill-all", post(kill_all))
        .route("/api/runners/attach-tmux", post(attach_tmux))
        .route("/api/runners/{id}", get(get_runner))
        .route("/api/runners/{id}/start", post(start_runner))
        .route("/api/runners/{id}/stop", post(stop_runner))
        .route("/api/runners/{id}/restart", post(restart_runner))
        .route("/api/runners/{id}/input", post(write_runner))
        .route("/api/runners/{id}/resize", post(resize_runner))
        .route("/api/runners/{id}/logs", get(runner_logs))
        .route("/api/tmux/sessions", get(list_tmux_sessions))
}
