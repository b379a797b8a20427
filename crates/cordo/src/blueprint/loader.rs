//! Blueprint directory loader.
//!
//! Layout per blueprint:
//!
//! ```text
//! <root>/<name>/
//!   agent.json                 # manifest
//!   agent.system-prompt.md     # agent-type only
//!   agent.mcp.json             # agent-type only, optional
//!   agent.parameters.json      # deterministic-type only, optional schema
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use log::debug;
use serde_json::Value;

use cordo_protocol::BlueprintKind;

use crate::error::{CoordError, CoordResult};

use super::models::{Blueprint, BlueprintManifest};

const MANIFEST_FILE: &str = "agent.json";
const SYSTEM_PROMPT_FILE: &str = "agent.system-prompt.md";
const MCP_FILE: &str = "agent.mcp.json";
const PARAMETERS_FILE: &str = "agent.parameters.json";

/// Loads blueprints by name from a root directory. Reads go to disk every
/// time; blueprints are small and editing them must not require a restart.
#[derive(Debug, Clone)]
pub struct BlueprintStore {
    root: PathBuf,
}

impl BlueprintStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load and validate one blueprint.
    pub fn load(&self, name: &str) -> CoordResult<Blueprint> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoordError::validation(format!(
                "invalid blueprint name: {:?}",
                name
            )));
        }

        let dir = self.root.join(name);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(CoordError::validation(format!(
                "blueprint {} not found under {}",
                name,
                self.root.display()
            )));
        }

        let manifest: BlueprintManifest = read_json(&manifest_path)?;
        if manifest.name != name {
            return Err(CoordError::validation(format!(
                "blueprint manifest name {:?} does not match directory {:?}",
                manifest.name, name
            )));
        }

        let blueprint = match manifest.kind {
            BlueprintKind::Agent => self.load_agent(&dir, manifest)?,
            BlueprintKind::Deterministic => self.load_deterministic(&dir, manifest)?,
        };

        debug!("loaded blueprint {} ({:?})", blueprint.name, blueprint.kind);
        Ok(blueprint)
    }

    fn load_agent(&self, dir: &Path, manifest: BlueprintManifest) -> CoordResult<Blueprint> {
        let prompt_path = dir.join(SYSTEM_PROMPT_FILE);
        if !prompt_path.is_file() {
            return Err(CoordError::validation(format!(
                "agent blueprint {} is missing {}",
                manifest.name, SYSTEM_PROMPT_FILE
            )));
        }
        let system_prompt = std::fs::read_to_string(&prompt_path)
            .with_context(|| format!("reading {}", prompt_path.display()))?;

        let mcp_path = dir.join(MCP_FILE);
        let mcp_servers: Option<Value> = if mcp_path.is_file() {
            Some(read_json(&mcp_path)?)
        } else {
            None
        };

        if manifest.command.is_some() {
            return Err(CoordError::validation(format!(
                "agent blueprint {} must not declare a command",
                manifest.name
            )));
        }

        Ok(Blueprint {
            name: manifest.name,
            description: manifest.description,
            kind: BlueprintKind::Agent,
            tags: manifest.tags,
            demands: manifest.demands,
            parameters_schema: manifest.parameters_schema,
            output_schema: manifest.output_schema,
            system_prompt: Some(system_prompt),
            mcp_servers,
            command: None,
            parameter_strategy: None,
            timeout_seconds: manifest.timeout_seconds,
        })
    }

    fn load_deterministic(
        &self,
        dir: &Path,
        manifest: BlueprintManifest,
    ) -> CoordResult<Blueprint> {
        if manifest.command.is_none() {
            return Err(CoordError::validation(format!(
                "deterministic blueprint {} must declare a command",
                manifest.name
            )));
        }
        if manifest.output_schema.is_some() {
            return Err(CoordError::validation(format!(
                "deterministic blueprint {} cannot declare an output schema",
                manifest.name
            )));
        }

        // The schema can live inline in the manifest or in a companion file;
        // the file wins when both exist.
        let parameters_path = dir.join(PARAMETERS_FILE);
        let parameters_schema = if parameters_path.is_file() {
            Some(read_json(&parameters_path)?)
        } else {
            manifest.parameters_schema
        };

        Ok(Blueprint {
            name: manifest.name,
            description: manifest.description,
            kind: BlueprintKind::Deterministic,
            tags: manifest.tags,
            demands: manifest.demands,
            parameters_schema,
            output_schema: None,
            system_prompt: None,
            mcp_servers: None,
            command: manifest.command,
            parameter_strategy: manifest.parameter_strategy,
            timeout_seconds: manifest.timeout_seconds,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CoordResult<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))
        .map_err(CoordError::Internal)?;

    serde_json::from_str(&raw)
        .map_err(|e| CoordError::validation(format!("invalid JSON in {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_blueprint(root: &Path, name: &str, manifest: &Value, prompt: Option<&str>) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
        if let Some(prompt) = prompt {
            std::fs::write(dir.join(SYSTEM_PROMPT_FILE), prompt).unwrap();
        }
    }

    #[test]
    fn loads_agent_blueprint() {
        let tmp = TempDir::new().unwrap();
        write_blueprint(
            tmp.path(),
            "hello",
            &json!({
                "name": "hello",
                "type": "agent",
                "tags": ["demo"],
                "demands": {"tags": ["python"]}
            }),
            Some("You are hello."),
        );

        let store = BlueprintStore::new(tmp.path());
        let blueprint = store.load("hello").unwrap();
        assert_eq!(blueprint.kind, BlueprintKind::Agent);
        assert_eq!(blueprint.system_prompt.as_deref(), Some("You are hello."));
        assert!(blueprint.demands.tags.contains("python"));
    }

    #[test]
    fn missing_blueprint_is_a_validation_error() {
        let tmp = TempDir::new().unwrap();
        let store = BlueprintStore::new(tmp.path());
        let err = store.load("ghost").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn rejects_path_traversal_names() {
        let tmp = TempDir::new().unwrap();
        let store = BlueprintStore::new(tmp.path());
        assert!(store.load("../etc").is_err());
        assert!(store.load("a/b").is_err());
        assert!(store.load("").is_err());
    }

    #[test]
    fn manifest_name_must_match_directory() {
        let tmp = TempDir::new().unwrap();
        write_blueprint(
            tmp.path(),
            "hello",
            &json!({"name": "goodbye", "type": "agent"}),
            Some("prompt"),
        );

        let store = BlueprintStore::new(tmp.path());
        let err = store.load("hello").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn agent_requires_system_prompt() {
        let tmp = TempDir::new().unwrap();
        write_blueprint(
            tmp.path(),
            "hello",
            &json!({"name": "hello", "type": "agent"}),
            None,
        );

        let store = BlueprintStore::new(tmp.path());
        assert!(store.load("hello").is_err());
    }

    #[test]
    fn deterministic_requires_command_and_reads_schema_file() {
        let tmp = TempDir::new().unwrap();
        write_blueprint(
            tmp.path(),
            "lint",
            &json!({
                "name": "lint",
                "type": "deterministic",
                "command": "cargo clippy",
                "parameter_strategy": "stdin_json"
            }),
            None,
        );
        std::fs::write(
            tmp.path().join("lint").join(PARAMETERS_FILE),
            json!({"type": "object"}).to_string(),
        )
        .unwrap();

        let store = BlueprintStore::new(tmp.path());
        let blueprint = store.load("lint").unwrap();
        assert_eq!(blueprint.command.as_deref(), Some("cargo clippy"));
        assert_eq!(blueprint.parameters_schema, Some(json!({"type": "object"})));

        write_blueprint(
            tmp.path(),
            "broken",
            &json!({"name": "broken", "type": "deterministic"}),
            None,
        );
        assert!(store.load("broken").is_err());
    }
}
