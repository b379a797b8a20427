//! Session data models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no run has started yet.
    Pending,
    /// A run is executing against this session.
    Running,
    /// Final run completed successfully.
    Finished,
    /// Final run failed.
    Error,
    /// Final run was stopped.
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Finished | SessionStatus::Error | SessionStatus::Stopped
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Finished => write!(f, "finished"),
            SessionStatus::Error => write!(f, "error"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "running" => Ok(SessionStatus::Running),
            "finished" => Ok(SessionStatus::Finished),
            "error" => Ok(SessionStatus::Error),
            "stopped" => Ok(SessionStatus::Stopped),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Whether and how a session's completion is delivered to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Caller blocks on its own polling; no coordinator-side delivery.
    Sync,
    /// Caller polls the session record for the result.
    AsyncPoll,
    /// On completion the coordinator resumes the parent with the result.
    AsyncCallback,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Sync => write!(f, "SYNC"),
            ExecutionMode::AsyncPoll => write!(f, "ASYNC_POLL"),
            ExecutionMode::AsyncCallback => write!(f, "ASYNC_CALLBACK"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYNC" => Ok(ExecutionMode::Sync),
            "ASYNC_POLL" => Ok(ExecutionMode::AsyncPoll),
            "ASYNC_CALLBACK" => Ok(ExecutionMode::AsyncCallback),
            _ => Err(format!("unknown execution mode: {}", s)),
        }
    }
}

impl TryFrom<String> for ExecutionMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Durable record of one conversation with an external AI or task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Coordinator-generated, immutable (`ses_<hex>`).
    pub session_id: String,
    /// Blueprint reference.
    pub agent_name: String,
    pub status: SessionStatus,
    pub execution_mode: ExecutionMode,
    pub parent_session_id: Option<String>,
    /// Opaque creator tag supplied at run creation; list/stream filter only.
    pub created_by: Option<String>,
    /// Framework-side id, bound once by the executor at first contact.
    pub executor_session_id: Option<String>,
    pub executor_type: Option<String>,
    /// Affinity pair, set at binding, never modified.
    pub hostname: Option<String>,
    pub project_dir: Option<String>,
    pub result_text: Option<String>,
    pub result_data: Option<Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub last_resumed_at: Option<String>,
}

impl Session {
    /// The bound affinity tuple, if the session has been bound.
    pub fn affinity(&self) -> Option<(&str, &str, &str)> {
        match (&self.hostname, &self.project_dir, &self.executor_type) {
            (Some(h), Some(p), Some(t)) => Some((h, p, t)),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.executor_session_id.is_some()
    }
}

/// Fields required to insert a fresh session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: String,
    pub agent_name: String,
    pub execution_mode: ExecutionMode,
    pub parent_session_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// Filter for session listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    pub created_by: Option<String>,
    pub parent: Option<String>,
}

/// One entry of a session's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    /// Monotonic within the session, starting at 1.
    pub sequence: i64,
    pub event_type: String,
    pub payload: Value,
    pub run_id: Option<String>,
    pub created_at: String,
}
