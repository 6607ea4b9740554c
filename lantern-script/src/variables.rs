//! Decoding of the user's extra-variables text.
//!
//! Blank text means "no variables" and is distinct from an empty mapping:
//! only non-blank text is ever handed to the engine.

use serde_json::Value;

use crate::error::ScriptError;

/// Decode `text` as a JSON object or, failing that, a YAML mapping.
///
/// Returns `Ok(None)` for blank text.
pub fn parse_variables(text: &str) -> Result<Option<Value>, ScriptError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return Ok(Some(value));
    }

    match serde_yaml::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(Some(value)),
        Ok(other) => Err(ScriptError::VariablesMalformed {
            reason: format!("expected a mapping, found {}", kind_name(&other)),
        }),
        Err(err) => Err(ScriptError::VariablesMalformed {
            reason: err.to_string(),
        }),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
