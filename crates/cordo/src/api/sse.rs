//! Server-Sent Events stream of session and run lifecycle frames.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::instrument;

use crate::events::{FrameKind, StreamFrame};

use super::state::AppState;

/// Stream filter: by session or by creator tag.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn matches(frame: &StreamFrame, query: &StreamQuery) -> bool {
    if let Some(wanted) = &query.session_id {
        if frame.session_id.as_deref() != Some(wanted.as_str()) {
            return false;
        }
    }
    if let Some(wanted) = &query.created_by {
        if frame.created_by.as_deref() != Some(wanted.as_str()) {
            return false;
        }
    }
    true
}

fn to_event(frame: &StreamFrame) -> Event {
    Event::default()
        .id(frame.id.to_string())
        .event(frame.kind.as_str())
        .data(frame.data.to_string())
}

/// `GET /sse/sessions` — an `init` frame, then every matching lifecycle and
/// session-event frame. `Last-Event-ID` replays buffered frames missed
/// across a reconnect.
#[instrument(skip(state, headers))]
pub async fn sse_sessions(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let last_event_id: Option<u64> = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    // Subscribe before snapshotting the replay ring so nothing published in
    // between is lost; duplicates are dropped by the id watermark below.
    let live = BroadcastStream::new(state.hub.subscribe());
    let backlog: Vec<StreamFrame> = last_event_id
        .map(|id| state.hub.replay_after(id))
        .unwrap_or_default();

    let init_id = state.hub.last_id();
    let init = Event::default()
        .id(init_id.to_string())
        .event(FrameKind::Init.as_str())
        .data(
            json!({
                "last_event_id": init_id,
                "filters": {
                    "session_id": query.session_id.clone(),
                    "created_by": query.created_by.clone(),
                },
            })
            .to_string(),
        );

    let watermark = Arc::new(AtomicU64::new(last_event_id.unwrap_or(0)));
    let query = Arc::new(query);

    let backlog_stream = {
        let watermark = watermark.clone();
        let query = query.clone();
        tokio_stream::iter(backlog).filter_map(move |frame| {
            if !matches(&frame, &query) {
                return None;
            }
            watermark.fetch_max(frame.id, Ordering::Relaxed);
            Some(Ok(to_event(&frame)))
        })
    };

    let live_stream = live.filter_map(move |result| {
        // A lagged receiver just skips; the client can reconnect with
        // Last-Event-ID to recover from the replay ring.
        let frame = result.ok()?;
        if frame.id <= watermark.load(Ordering::Relaxed) || !matches(&frame, &query) {
            return None;
        }
        watermark.fetch_max(frame.id, Ordering::Relaxed);
        Some(Ok(to_event(&frame)))
    });

    let stream = tokio_stream::once(Ok::<_, Infallible>(init))
        .chain(backlog_stream)
        .chain(live_stream);

    Sse::new(stream).keep_alive(KeepAlive::default())
}
