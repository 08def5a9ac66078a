use serde_json::Value;

/// Validate an argument object against a tool's JSON schema.
///
/// Covers the subset the built-in schemas use: a top-level object with typed
/// properties and a `required` list. The error text names the offending
/// field so it can go straight into a Tool turn.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(object) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(format!("missing required field '{field}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, prop) in properties {
            let Some(value) = object.get(field) else {
                continue;
            };
            let Some(expected) = prop.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!("field '{field}' must be of type {expected}"));
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
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
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
                "pin": {"type": "integer"},
                "level": {"type": "integer"},
                "label": {"type": "string"}
            },
            "required": ["pin", "level"]
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        assert!(validate_args(&schema(), &json!({"pin": 5, "level": 1})).is_ok());
    }

    #[test]
    fn names_missing_field() {
        let err = validate_args(&schema(), &json!({"pin": 5})).unwrap_err();
        assert_eq!(err, "missing required field 'level'");
    }

    #[test]
    fn names_mistyped_field() {
        let err = validate_args(&schema(), &json!({"pin": "five", "level": 1})).unwrap_err();
        assert_eq!(err, "field 'pin' must be of type integer");
    }

    #[test]
    fn optional_fields_validated_when_present() {
        let err =
            validate_args(&schema(), &json!({"pin": 1, "level": 0, "label": 7})).unwrap_err();
        assert_eq!(err, "field 'label' must be of type string");
    }

    #[test]
    fn rejects_non_object_arguments() {
        assert!(validate_args(&schema(), &json!([1, 2])).is_err());
    }
}
