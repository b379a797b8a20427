//! Blueprint data models.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use cordo_protocol::{BlueprintKind, Demands, ParameterStrategy, ResolvedBlueprint};

/// `agent.json` as it appears on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct BlueprintManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: BlueprintKind,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub demands: Demands,
    #[serde(default)]
    pub parameters_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub parameter_strategy: Option<ParameterStrategy>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// A fully loaded blueprint: manifest plus companion files.
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub name: String,
    pub description: Option<String>,
    pub kind: BlueprintKind,
    pub tags: BTreeSet<String>,
    pub demands: Demands,
    pub parameters_schema: Option<Value>,
    pub output_schema: Option<Value>,
    /// Agent-type only.
    pub system_prompt: Option<String>,
    /// Agent-type only.
    pub mcp_servers: Option<Value>,
    /// Deterministic-type only.
    pub command: Option<String>,
    pub parameter_strategy: Option<ParameterStrategy>,
    pub timeout_seconds: Option<u64>,
}

impl Blueprint {
    /// The payload-side rendition, before placeholder resolution.
    pub fn to_resolved(&self) -> ResolvedBlueprint {
        ResolvedBlueprint {
            name: self.name.clone(),
            kind: self.kind,
            system_prompt: self.system_prompt.clone(),
            mcp_servers: self.mcp_servers.clone(),
            output_schema: self.output_schema.clone(),
            command: self.command.clone(),
            parameter_strategy: self.parameter_strategy,
            timeout_seconds: self.timeout_seconds,
        }
    }
}
