//! API route definitions.

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::sse;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    Router::new()
        .route("/health", get(handlers::health))
        // Runs
        .route("/runs", post(handlers::create_run))
        .route("/runs/{run_id}", get(handlers::get_run))
        // Sessions
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{session_id}/bind", post(handlers::bind_session))
        .route(
            "/sessions/{session_id}/events",
            post(handlers::append_event).get(handlers::list_events),
        )
        .route("/sessions/{session_id}/stop", post(handlers::stop_session))
        .route(
            "/sessions/{session_id}/children",
            get(handlers::list_children),
        )
        // Runner protocol
        .route("/runner/register", post(handlers::register))
        .route("/runner/heartbeat", post(handlers::heartbeat))
        .route("/runner/runs", get(handlers::poll_runs))
        .route(
            "/runner/runs/{run_id}/started",
            post(handlers::report_started),
        )
        .route(
            "/runner/runs/{run_id}/completed",
            post(handlers::report_completed),
        )
        .route("/runners", get(handlers::list_runners))
        // Relations
        .route("/relations/definitions", get(handlers::list_definitions))
        .route("/relations", post(handlers::create_relation))
        .route(
            "/relations/{id}",
            patch(handlers::update_relation).delete(handlers::delete_relation),
        )
        // Real-time fan-out
        .route("/sse/sessions", get(sse::sse_sessions))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
