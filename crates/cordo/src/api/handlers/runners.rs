//! Runner-facing handlers: register, heartbeat, long-poll, run reports.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use cordo_protocol::{
    CompleteRunRequest, HeartbeatResponse, RegisterRequest, RegisterResponse,
};

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::clock;
use crate::runner::RunnerStatus;

/// Register (or re-register) a runner. The response id is derived from the
/// identity tuple, so reconnects land on the same record.
#[instrument(skip(state, request), fields(hostname = %request.hostname))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let runner_id = state.registry.register(&request);
    info!(runner_id = %runner_id, "Runner registered");
    Ok(Json(RegisterResponse { runner_id }))
}

#[derive(Debug, Deserialize)]
pub struct RunnerIdQuery {
    pub runner_id: String,
}

/// Heartbeat; flips a stale runner back to online.
#[instrument(skip(state))]
pub async fn heartbeat(
    State(state): State<AppState>,
    Query(query): Query<RunnerIdQuery>,
) -> ApiResult<Json<HeartbeatResponse>> {
    state.registry.heartbeat(&query.runner_id)?;
    Ok(Json(HeartbeatResponse {
        status: "ok".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub runner_id: String,
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
}

/// Long-poll for work. Answers with a run payload or a stop envelope, or
/// `204` when `max_wait` elapses with nothing to do.
#[instrument(skip(state))]
pub async fn poll_runs(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Response> {
    let max_wait = query
        .max_wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.config.queue.long_poll_max_wait());

    match state.runs.poll(&query.runner_id, max_wait).await? {
        Some(message) => Ok(Json(message).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// The claiming runner reports the executor has started.
#[instrument(skip(state))]
pub async fn report_started(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<RunnerIdQuery>,
) -> ApiResult<StatusCode> {
    state.runs.report_started(&run_id, &query.runner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The claiming runner reports a terminal status with the result.
#[instrument(skip(state, report), fields(status = %report.status))]
pub async fn report_completed(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<RunnerIdQuery>,
    Json(report): Json<CompleteRunRequest>,
) -> ApiResult<StatusCode> {
    state
        .runs
        .report_completed(&run_id, &query.runner_id, report)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Inspection view of a registered runner.
#[derive(Debug, Serialize)]
pub struct RunnerView {
    pub runner_id: String,
    pub hostname: String,
    pub project_dir: String,
    pub executor_type: String,
    pub tags: Vec<String>,
    pub status: RunnerStatus,
    pub registered_at: String,
    pub last_heartbeat_at: String,
}

/// List registered runners.
#[instrument(skip(state))]
pub async fn list_runners(State(state): State<AppState>) -> ApiResult<Json<Vec<RunnerView>>> {
    let runners = state
        .registry
        .list()
        .into_iter()
        .map(|r| RunnerView {
            runner_id: r.runner_id,
            hostname: r.hostname,
            project_dir: r.project_dir,
            executor_type: r.executor_type,
            tags: r.tags.into_iter().collect(),
            status: r.status,
            registered_at: clock::format_ts(r.registered_at),
            last_heartbeat_at: clock::format_ts(r.last_heartbeat_at),
        })
        .collect();
    Ok(Json(runners))
}
