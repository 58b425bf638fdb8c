//! Schema inference from sample documents.

use alloc::vec::Vec;

use serde_json::{Map, Value, json};

/// Infers a text schema from a sample document.
///
/// Every key present in a sample object is required unless its value is
/// `null`. Array elements are merged into one item schema: objects merge
/// member-wise (keys missing from some elements become optional), `integer`
/// widens to `number`, and unrelated kinds become a `oneOf`.
pub fn infer(sample: &Value) -> Value {
    match sample {
        Value::Null => json!({ "type": "null" }),
        Value::Bool(_) => json!({ "type": "boolean" }),
        Value::Number(n) if n.is_f64() => json!({ "type": "number" }),
        Value::Number(_) => json!({ "type": "integer" }),
        Value::String(_) => json!({ "type": "string" }),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(infer)
                .reduce(merge)
                .unwrap_or_else(|| json!({ "type": "null" }));
            json!({ "type": "array", "items": items })
        }
        Value::Object(members) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (key, value) in members {
                if !value.is_null() {
                    required.push(Value::String(key.clone()));
                }
                properties.insert(key.clone(), infer(value));
            }
            json!({ "type": "object", "properties": properties, "required": required })
        }
    }
}

fn kind(schema: &Value) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

/// Combines two inferred schemas into one accepting both.
fn merge(a: Value, b: Value) -> Value {
    if a == b {
        return a;
    }
    match (kind(&a), kind(&b)) {
        (Some("integer"), Some("number")) | (Some("number"), Some("integer")) => {
            json!({ "type": "number" })
        }
        (Some("object"), Some("object")) => merge_objects(a, b),
        (Some("array"), Some("array")) => {
            let items = merge(
                a.get("items").cloned().unwrap_or(Value::Null),
                b.get("items").cloned().unwrap_or(Value::Null),
            );
            json!({ "type": "array", "items": items })
        }
        _ => one_of(a, b),
    }
}

fn required_of(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn merge_objects(a: Value, b: Value) -> Value {
    let empty = Map::new();
    let a_props = a.get("properties").and_then(Value::as_object).unwrap_or(&empty);
    let b_props = b.get("properties").and_then(Value::as_object).unwrap_or(&empty);
    let (a_required, b_required) = (required_of(&a), required_of(&b));

    let mut properties = Map::new();
    let mut required = Vec::new();
    for (key, schema) in a_props {
        let merged = match b_props.get(key) {
            Some(other) => merge_member(schema.clone(), other.clone()),
            None => schema.clone(),
        };
        properties.insert(key.clone(), merged);
        if a_required.contains(&key.as_str()) && b_required.contains(&key.as_str()) {
            required.push(Value::String(key.clone()));
        }
    }
    for (key, schema) in b_props {
        if !a_props.contains_key(key) {
            properties.insert(key.clone(), schema.clone());
        }
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

/// A member that was `null` in one sample takes the other sample's schema;
/// it is already optional.
fn merge_member(a: Value, b: Value) -> Value {
    match (kind(&a), kind(&b)) {
        (Some("null"), _) => b,
        (_, Some("null")) => a,
        _ => merge(a, b),
    }
}

fn one_of(a: Value, b: Value) -> Value {
    let mut alternatives = Vec::new();
    for schema in [a, b] {
        match schema.get("oneOf").and_then(Value::as_array) {
            Some(nested) => alternatives.extend(nested.iter().cloned()),
            None => alternatives.push(schema),
        }
    }
    let mut unique: Vec<Value> = Vec::with_capacity(alternatives.len());
    for alternative in alternatives {
        if !unique.contains(&alternative) {
            unique.push(alternative);
        }
    }
    json!({ "oneOf": unique })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_require_present_members() {
        deflate_testhelpers::setup();
        let schema = infer(&json!({ "name": "Ann", "age": 30, "email": null }));
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "age": { "type": "integer" },
                    "email": { "type": "null" }
                },
                "required": ["name", "age"]
            })
        );
    }

    #[test]
    fn decimals_widen_integers() {
        deflate_testhelpers::setup();
        let schema = infer(&json!([1, 2.5, 3]));
        assert_eq!(schema, json!({ "type": "array", "items": { "type": "number" } }));
    }

    #[test]
    fn elements_merge_member_wise() {
        deflate_testhelpers::setup();
        let schema = infer(&json!([
            { "id": 1, "note": null },
            { "id": 2, "note": "x", "extra": true }
        ]));
        assert_eq!(
            schema,
            json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer" },
                        "note": { "type": "string" },
                        "extra": { "type": "boolean" }
                    },
                    "required": ["id"]
                }
            })
        );
    }

    #[test]
    fn unrelated_kinds_become_one_of() {
        deflate_testhelpers::setup();
        let schema = infer(&json!([1, "a", null, 2, "b"]));
        assert_eq!(
            schema,
            json!({
                "type": "array",
                "items": {
                    "oneOf": [
                        { "type": "integer" },
                        { "type": "string" },
                        { "type": "null" }
                    ]
                }
            })
        );
    }

    #[test]
    fn inferred_schemas_compile() {
        deflate_testhelpers::setup();
        let sample = json!({ "items": [{ "id": 1, "tags": ["a"] }], "total": 1.5 });
        let container = crate::compile(&infer(&sample), &crate::CompileOptions::default());
        assert!(container.is_ok(), "{container:?}");
    }
}
