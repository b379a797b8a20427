//! JSON-Schema validation for run parameters.

use once_cell::sync::Lazy;
use serde_json::{Value, json};

use crate::error::{CoordError, CoordResult};

/// Schema applied to agent runs with no declared `parameters_schema`, and to
/// every resume run (resume is conversational).
static IMPLICIT_PROMPT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["prompt"],
        "properties": {
            "prompt": {"type": "string"}
        }
    })
});

pub fn implicit_prompt_schema() -> &'static Value {
    &IMPLICIT_PROMPT_SCHEMA
}

/// Validate `parameters` against `schema`, collecting every violation into
/// one message.
pub fn validate_parameters(schema: &Value, parameters: &Value) -> CoordResult<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| CoordError::validation(format!("invalid parameters schema: {}", e)))?;

    let errors: Vec<String> = validator
        .iter_errors(parameters)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoordError::validation(format!(
            "parameters failed schema validation: {}",
            errors.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_schema_requires_string_prompt() {
        let schema = implicit_prompt_schema();

        assert!(validate_parameters(schema, &json!({"prompt": "hi"})).is_ok());
        assert!(validate_parameters(schema, &json!({})).is_err());
        assert!(validate_parameters(schema, &json!({"prompt": 7})).is_err());
    }

    #[test]
    fn custom_schema_is_enforced() {
        let schema = json!({
            "type": "object",
            "required": ["count"],
            "properties": {
                "count": {"type": "integer", "minimum": 1}
            }
        });

        assert!(validate_parameters(&schema, &json!({"count": 3})).is_ok());

        let err = validate_parameters(&schema, &json!({"count": 0})).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn multiple_violations_are_aggregated() {
        let schema = json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "string"}
            }
        });

        let err = validate_parameters(&schema, &json!({"a": 1})).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("1"), "mentions the bad value: {message}");
        assert!(message.contains("b"), "mentions the missing field: {message}");
    }

    #[test]
    fn broken_schema_is_reported_not_panicked() {
        let schema = json!({"type": "definitely-not-a-type"});
        assert!(validate_parameters(&schema, &json!({})).is_err());
    }
}
