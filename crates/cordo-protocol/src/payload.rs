//! Resolved run payloads.
//!
//! The payload is assembled at run creation (blueprint loaded, parameters
//! validated, placeholders substituted) and handed verbatim to the claiming
//! runner. The only placeholders left unresolved are `${runner.*}`, which the
//! runner substitutes itself before spawning the executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of activation a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    StartSession,
    ResumeSession,
    ExecuteTask,
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunType::StartSession => write!(f, "start_session"),
            RunType::ResumeSession => write!(f, "resume_session"),
            RunType::ExecuteTask => write!(f, "execute_task"),
        }
    }
}

/// Blueprint flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintKind {
    Agent,
    Deterministic,
}

/// How a deterministic task receives its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterStrategy {
    StdinJson,
    Args,
    Env,
    File,
}

/// Blueprint content after placeholder resolution, ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBlueprint {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: BlueprintKind,

    /// Agent-type only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Agent-type only: resolved MCP server configuration. May still contain
    /// `${runner.*}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Value>,

    /// Agent-type only: schema the executor validates its final output
    /// against before reporting completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Deterministic-type only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_strategy: Option<ParameterStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Coordinator-side context substituted for `${runtime.*}` and also shipped
/// alongside the payload so runners can tag their reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeContext {
    pub session_id: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
}

/// The self-contained unit of work a runner receives from a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPayload {
    pub run_id: String,
    pub session_id: String,

    #[serde(rename = "type")]
    pub run_type: RunType,

    pub agent_name: String,

    /// Set on resume runs: the framework session to pick back up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_session_id: Option<String>,

    pub blueprint: ResolvedBlueprint,

    /// Validated, placeholder-resolved parameters.
    pub parameters: Value,

    pub runtime: RuntimeContext,
}
