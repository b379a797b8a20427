//! Placeholder substitution for blueprint payloads.
//!
//! Placeholders take the form `${source.key}`. Sources resolved here:
//! `params`, `scope`, `env`, and `runtime`. `${runner.*}` placeholders are
//! preserved verbatim for the runner to resolve. A placeholder that cannot be
//! resolved fails the whole run creation; nothing half-resolved ever reaches
//! the queue.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use cordo_protocol::RuntimeContext;

use crate::error::{CoordError, CoordResult};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)\.([a-zA-Z0-9_][a-zA-Z0-9_.\-]*)\}")
        .expect("placeholder regex")
});

/// Everything a substitution pass may draw from.
pub struct PlaceholderContext<'a> {
    pub params: &'a Value,
    pub scope: &'a Map<String, Value>,
    pub runtime: &'a RuntimeContext,
}

/// Recursively resolve every string in `value`.
pub fn resolve_value(value: &Value, ctx: &PlaceholderContext<'_>) -> CoordResult<Value> {
    match value {
        Value::String(s) => Ok(Value::String(resolve_str(s, ctx)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, ctx))
            .collect::<CoordResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), resolve_value(item, ctx)?);
            }
            Ok(Value::Object(out))
        }
        _ => Ok(value.clone()),
    }
}

/// Resolve placeholders inside a single string.
pub fn resolve_str(input: &str, ctx: &PlaceholderContext<'_>) -> CoordResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(input) {
        let whole = caps.get(0).expect("match");
        let source = &caps[1];
        let key = &caps[2];

        out.push_str(&input[last..whole.start()]);
        last = whole.end();

        match source {
            // Resolved on the runner, not here.
            "runner" => out.push_str(whole.as_str()),
            "params" => out.push_str(&lookup(ctx.params, key).ok_or_else(|| {
                CoordError::validation(format!("unresolved placeholder {}", whole.as_str()))
            })?),
            "scope" => {
                let value = ctx.scope.get(key).and_then(value_as_string).ok_or_else(|| {
                    CoordError::validation(format!("unresolved placeholder {}", whole.as_str()))
                })?;
                out.push_str(&value);
            }
            "env" => match std::env::var(key) {
                Ok(value) => out.push_str(&value),
                Err(_) => {
                    return Err(CoordError::validation(format!(
                        "unresolved placeholder {} (environment variable not set)",
                        whole.as_str()
                    )));
                }
            },
            "runtime" => {
                let value = match key {
                    "session_id" => Some(ctx.runtime.session_id.clone()),
                    "run_id" => Some(ctx.runtime.run_id.clone()),
                    "parent_session_id" => ctx.runtime.parent_session_id.clone(),
                    _ => None,
                };
                match value {
                    Some(v) => out.push_str(&v),
                    None => {
                        return Err(CoordError::validation(format!(
                            "unresolved placeholder {}",
                            whole.as_str()
                        )));
                    }
                }
            }
            other => {
                return Err(CoordError::validation(format!(
                    "unknown placeholder source {:?} in {}",
                    other,
                    whole.as_str()
                )));
            }
        }
    }

    out.push_str(&input[last..]);
    Ok(out)
}

/// Dotted-path lookup into the parameters object.
fn lookup(params: &Value, key: &str) -> Option<String> {
    let mut current = params;
    for segment in key.split('.') {
        current = current.get(segment)?;
    }
    value_as_string(current)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}
