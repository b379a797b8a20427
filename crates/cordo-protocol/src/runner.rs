//! Runner-facing wire messages.
//!
//! Runners register with their identity tuple, heartbeat to stay online, and
//! long-poll for work. A poll answer is either a run payload or a stop
//! command; the two are distinguished by the tagged `kind` field so runner
//! implementations never have to sniff payload shapes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::RunPayload;

// ============================================================================
// Registration & heartbeat
// ============================================================================

/// Body of `POST /runner/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub project_dir: String,
    pub executor_type: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Response to registration; the id is derived from the identity tuple, so
/// re-registering from the same place always yields the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub runner_id: String,
}

/// Response to `POST /runner/heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
}

// ============================================================================
// Long-poll envelope
// ============================================================================

/// Instruction to stop a run the runner currently holds.
///
/// The runner is expected to SIGTERM the executor, wait up to its grace
/// window, SIGKILL, then report the run `stopped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopCommand {
    pub run_id: String,
    pub session_id: String,
}

/// Answer to `GET /runner/runs` when work is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollMessage {
    /// A claimed run; the runner now owns it until a terminal report.
    Run(RunPayload),

    /// Stop a run previously delivered to this runner.
    Stop(StopCommand),
}

// ============================================================================
// Run reports
// ============================================================================

/// Terminal status a runner may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    Stopped,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Failed => write!(f, "failed"),
            RunOutcome::Stopped => write!(f, "stopped"),
        }
    }
}

/// Body of `POST /runner/runs/{run_id}/completed`.
///
/// `result_text` and `result_data` are mutually exclusive; `result_data` is
/// only reported for agents whose blueprint declares an output schema, after
/// the executor has validated it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRunRequest {
    pub status: RunOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set by the executor when retrying against the output schema was
    /// exhausted; surfaces as a distinct error kind on the session.
    #[serde(default)]
    pub output_schema_violation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn poll_message_is_tagged_by_kind() {
        let stop = PollMessage::Stop(StopCommand {
            run_id: "run_aaaabbbbcccc".into(),
            session_id: "ses_aaaabbbbcccc".into(),
        });
        let wire = serde_json::to_value(&stop).unwrap();
        assert_eq!(wire["kind"], json!("stop"));
        assert_eq!(wire["run_id"], json!("run_aaaabbbbcccc"));
    }

    #[test]
    fn complete_request_defaults() {
        let req: CompleteRunRequest =
            serde_json::from_value(json!({"status": "completed", "result_text": "ok"})).unwrap();
        assert_eq!(req.status, RunOutcome::Completed);
        assert_eq!(req.result_text.as_deref(), Some("ok"));
        assert!(req.result_data.is_none());
        assert!(!req.output_schema_violation);
    }
}
