//! Minimal JSON-schema subset used for tool arguments and declared outputs:
//! `type`, `properties`, `required`, `enum`, `items`, `minimum`,
//! `additionalProperties: false`.

use serde_json::Value;

/// Validate `value` against `schema`. `Err` names the first mismatch.
pub fn validate(schema: &Value, value: &Value) -> Result<(), String> {
    validate_at(schema, value, "$")
}

fn validate_at(schema: &Value, value: &Value, at: &str) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type").and_then(Value::as_str)
        && !type_matches(expected, value)
    {
        return Err(format!("{at}: expected {expected}, got {}", type_name(value)));
    }

    if let Some(choices) = schema.get("enum").and_then(Value::as_array)
        && !choices.contains(value)
    {
        return Err(format!("{at}: {value} is not one of {}", Value::Array(choices.clone())));
    }

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64)
        && let Some(number) = value.as_f64()
        && number < minimum
    {
        return Err(format!("{at}: {number} is below minimum {minimum}"));
    }

    if let Some(object) = value.as_object() {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{at}: missing required field '{key}'"));
                }
            }
        }

        let closed = schema
            .get("additionalProperties")
            .is_some_and(|v| v == &Value::Bool(false));

        for (key, field) in object {
            match properties.and_then(|props| props.get(key)) {
                Some(field_schema) => validate_at(field_schema, field, &format!("{at}.{key}"))?,
                None if closed => return Err(format!("{at}: unexpected field '{key}'")),
                None => {}
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            validate_at(items, item, &format!("{at}[{index}]"))?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
