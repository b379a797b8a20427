//! Session event ingestion types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /sessions/{session_id}/events`.
///
/// The coordinator assigns the per-session sequence number; callers supply
/// only the event itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEventRequest {
    pub event_type: String,

    #[serde(default)]
    pub payload: Value,

    /// The run this event happened under, where the executor knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}
