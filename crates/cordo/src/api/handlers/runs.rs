//! Run creation and inspection handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::run::{CreateRunRequest, CreateRunResponse, Run};

/// Create a run (start, resume, or deterministic task).
#[instrument(skip(state, request), fields(run_type = %request.run_type))]
pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> ApiResult<(StatusCode, Json<CreateRunResponse>)> {
    let response = state.runs.create_run(request).await?;
    info!(
        run_id = %response.run_id,
        session_id = %response.session_id,
        "Created run"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// Inspect a single run. Terminal runs age out of the in-memory queue; the
/// session record is the durable source of truth.
#[instrument(skip(state))]
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<Run>> {
    state
        .runs
        .queue()
        .get(&run_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("run {}", run_id)))
}
