//! Minimal JSON schema validation for capability arguments.
//!
//! Covers the subset the capability catalogue actually uses: an object with
//! typed properties and a `required` list. Extra fields pass through
//! untouched; deep validation of nested objects is left to the handlers.

use serde_json::Value;

/// Validate `args` against `schema`. Returns a human-readable reason on the
/// first violation found.
pub fn validate(schema: &Value, args: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Ok(());
    }

    let Some(obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("missing required field '{name}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in properties {
            let Some(value) = obj.get(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let Some(expected) = prop.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!(
                    "field '{name}' should be of type {expected}, got {}",
                    type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": { "type": "string" },
                "limit": { "type": "integer" },
                "data": { "type": "object" }
            },
            "required": ["table"]
        })
    }

    #[test]
    fn test_valid_arguments() {
        let args = json!({ "table": "projects", "limit": 10 });
        assert!(validate(&schema(), &args).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&schema(), &json!({ "limit": 10 })).unwrap_err();
        assert!(err.contains("table"));
    }

    #[test]
    fn test_wrong_type() {
        let err = validate(&schema(), &json!({ "table": 42 })).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn test_null_optional_is_skipped() {
        let args = json!({ "table": "projects", "limit": null });
        assert!(validate(&schema(), &args).is_ok());
    }

    #[test]
    fn test_extra_fields_allowed() {
        let args = json!({ "table": "projects", "unknown": true });
        assert!(validate(&schema(), &args).is_ok());
    }

    #[test]
    fn test_non_object_args() {
        assert!(validate(&schema(), &json!("projects")).is_err());
    }
}
