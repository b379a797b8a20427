//! Session handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use cordo_protocol::AppendEventRequest;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::run::Run;
use crate::session::{Session, SessionEvent, SessionFilter};

/// Session plus its runs still held in the queue.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub runs: Vec<Run>,
}

/// Get a session with its binding, latest result, and in-memory runs.
#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let session = state.sessions.get(&session_id).await?;
    let runs = state.runs.queue().runs_for_session(&session_id);
    Ok(Json(SessionView { session, runs }))
}

/// List sessions, filterable by creator and parent.
#[instrument(skip(state))]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(filter): Query<SessionFilter>,
) -> ApiResult<Json<Vec<Session>>> {
    let sessions = state.sessions.list(&filter).await?;
    Ok(Json(sessions))
}

/// Direct children of a session.
#[instrument(skip(state))]
pub async fn list_children(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<Session>>> {
    let children = state.sessions.children(&session_id).await?;
    Ok(Json(children))
}

/// Body of `POST /sessions/{session_id}/bind`.
#[derive(Debug, Deserialize)]
pub struct BindRequest {
    pub executor_session_id: String,
    pub executor_type: String,
    pub hostname: String,
    pub project_dir: String,
}

/// One-shot executor binding; 409 on re-bind.
#[instrument(skip(state, request))]
pub async fn bind_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<BindRequest>,
) -> ApiResult<Json<Session>> {
    let session = state
        .sessions
        .bind(
            &session_id,
            &request.executor_session_id,
            &request.executor_type,
            &request.hostname,
            &request.project_dir,
        )
        .await?;
    info!(session_id = %session_id, executor_type = %request.executor_type, "Bound session");
    Ok(Json(session))
}

/// Append an event to a session's log.
#[instrument(skip(state, request), fields(event_type = %request.event_type))]
pub async fn append_event(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AppendEventRequest>,
) -> ApiResult<(StatusCode, Json<SessionEvent>)> {
    let event = state.sessions.append_event(&session_id, request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Query for event listing.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after_sequence: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

const DEFAULT_EVENT_PAGE: i64 = 200;

/// Page through a session's stored events in sequence order.
#[instrument(skip(state))]
pub async fn list_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Vec<SessionEvent>>> {
    let events = state
        .sessions
        .events_after(
            &session_id,
            query.after_sequence.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_EVENT_PAGE),
        )
        .await?;
    Ok(Json(events))
}

/// Move the session's active run to `stopping` and signal the owning runner.
#[instrument(skip(state))]
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Run>> {
    // 404 for unknown sessions, 404-on-no-active-run comes from the queue.
    state.sessions.get(&session_id).await?;
    let run = state.runs.stop_session(&session_id).await?;
    info!(session_id = %session_id, run_id = %run.run_id, "Stop requested");
    Ok(Json(run))
}

/// Admin cascade delete of the parent-child subtree.
#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.sessions.delete_cascade(&session_id).await?;
    info!(session_id = %session_id, count = deleted.len(), "Cascade deleted");
    Ok(Json(json!({"deleted": deleted})))
}
