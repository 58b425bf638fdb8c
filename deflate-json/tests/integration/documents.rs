use deflate_core::{Arena, ArenaConfig, Target};
use deflate_json::{DeflateError, DeflateStatus, Deserializer, ViolationKind, deflate, deflate_owned};
use deflate_testhelpers::IPanic;
use insta::assert_snapshot;
use serde_json::json;

use crate::common::Compiled;

fn person() -> Compiled {
    Compiled::new(json!({
        "title": "Person",
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "age": { "type": "integer" }
        },
        "required": ["name"]
    }))
}

#[test]
fn absent_optional_fields_read_as_none() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let person = person();
    let options = person.options(Target::Wasm32);
    let mut dest = vec![0u8; 256];
    let out = deflate(&person.blob, br#"{"name":"Ann"}"#, &mut dest, &options)?;

    let data = Arena::read_only(&dest[..]);
    let root = person.reader(Target::Wasm32, &data).root(out.root)?;
    assert_eq!(root.field("name")?.as_str()?, "Ann");
    assert!(root.field("age")?.option()?.is_none());
    Ok(())
}

#[test]
fn missing_required_field_is_reported_at_its_parent() {
    deflate_testhelpers::setup();
    let person = person();
    let options = person.options(Target::Wasm32);
    let mut dest = vec![0u8; 256];
    let err = deflate(&person.blob, br#"{"age":5}"#, &mut dest, &options).unwrap_err();
    assert_eq!(err.status(), DeflateStatus::ValidationError);
    assert!(!err.is_retryable());
    assert_snapshot!(err.to_string(), @r#"Missing required field "name" at /"#);
}

#[test]
fn siblings_are_checked_after_a_violation() {
    deflate_testhelpers::setup();
    let pair = Compiled::new(json!({
        "type": "object",
        "properties": {
            "a": { "type": "integer" },
            "b": { "type": "integer" },
            "c": { "type": "integer" }
        },
        "required": ["a", "b", "c"]
    }));
    let container = &pair.container;
    let root = container.schema().root(&container.wasm).unwrap();

    let mut data = Arena::owned(ArenaConfig::default()).unwrap();
    let mut de = Deserializer::new(container.schema(), container.wasm, Target::Wasm32, &mut data);
    let err = de
        .deserialize_root(root, &json!({ "a": "x", "b": 2, "c": [] }))
        .unwrap_err();
    assert_snapshot!(err.to_string(), @"Expected integer but found string at /a");

    let messages: Vec<String> = de.violations().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        [
            "Expected integer but found string at /a",
            "Expected integer but found array at /c",
        ]
    );
}

#[test]
fn fallible_fields_capture_their_errors() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let scored = Compiled::new(json!({
        "type": "object",
        "properties": {
            "score": { "type": "integer", "x-can-fail": true },
            "label": { "type": "string" }
        },
        "required": ["label"]
    }));
    let options = scored.options(Target::Wasm32);

    let cases = [
        (json!({ "label": "a", "score": null }), None),
        (json!({ "label": "b", "score": 7 }), Some(Ok(7))),
        (
            json!({ "label": "c", "score": "high" }),
            Some(Err("Expected integer but found string at /score")),
        ),
    ];
    for (doc, expected) in cases {
        let mut dest = vec![0u8; 512];
        let json = serde_json::to_vec(&doc).unwrap();
        let out = deflate(&scored.blob, &json, &mut dest, &options)?;

        let data = Arena::read_only(&dest[..]);
        let root = scored.reader(Target::Wasm32, &data).root(out.root)?;
        let score = match root.field("score")?.option()? {
            None => None,
            Some(result) => Some(match result.result()? {
                Ok(value) => Ok(value.as_i64()?),
                Err(message) => Err(message),
            }),
        };
        assert_eq!(score, expected, "{doc}");
    }
    Ok(())
}

#[test]
fn captured_errors_are_not_left_in_the_violations() {
    deflate_testhelpers::setup();
    let doc = Compiled::new(json!({
        "type": "object",
        "properties": { "n": { "type": "number", "x-can-fail": true } },
        "required": ["n"]
    }));
    let container = &doc.container;
    let root = container.schema().root(&container.wasm).unwrap();
    let mut data = Arena::owned(ArenaConfig::default()).unwrap();
    let mut de = Deserializer::new(container.schema(), container.wasm, Target::Wasm32, &mut data);
    de.deserialize_root(root, &json!({ "n": false })).unwrap();
    assert!(de.violations().is_empty());
}

#[test]
fn variants_pick_by_json_shape() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let value = Compiled::new(json!({
        "title": "Value",
        "oneOf": [
            { "type": "integer" },
            { "type": "number" },
            { "type": "object", "additionalProperties": { "type": "string" } },
            { "type": "null" }
        ]
    }));
    let options = value.options(Target::Wasm32);

    let mut dest = vec![0u8; 256];
    let out = deflate(&value.blob, b"5", &mut dest, &options)?;
    let data = Arena::read_only(&dest[..]);
    let (name, payload) = value.reader(Target::Wasm32, &data).root(out.root)?.variant()?;
    assert_eq!((name, payload.as_i64()?), ("integer", 5));

    let mut dest = vec![0u8; 256];
    let out = deflate(&value.blob, b"5.0", &mut dest, &options)?;
    let data = Arena::read_only(&dest[..]);
    let (name, payload) = value.reader(Target::Wasm32, &data).root(out.root)?.variant()?;
    assert_eq!((name, payload.as_f64()?), ("number", 5.0));

    let mut dest = vec![0u8; 256];
    let out = deflate(&value.blob, br#"{"k":"v"}"#, &mut dest, &options)?;
    let data = Arena::read_only(&dest[..]);
    let (name, payload) = value.reader(Target::Wasm32, &data).root(out.root)?.variant()?;
    assert_eq!(name, "Map<String>");
    assert_eq!(payload.map_get("k")?.map(|v| v.as_str()).transpose()?, Some("v"));

    let mut dest = vec![0u8; 256];
    let out = deflate(&value.blob, b"null", &mut dest, &options)?;
    let data = Arena::read_only(&dest[..]);
    let (name, payload) = value.reader(Target::Wasm32, &data).root(out.root)?.variant()?;
    assert_eq!(name, "unit");
    assert!(payload.is_unit());

    let mut dest = vec![0u8; 256];
    let err = deflate(&value.blob, b"true", &mut dest, &options).unwrap_err();
    assert_eq!(err.status(), DeflateStatus::SchemaError);
    assert_snapshot!(err.to_string(), @"variant `Value` has no alternative accepting boolean");
    Ok(())
}

#[test]
fn exponents_count_as_decimal_numbers() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let value = Compiled::new(json!({
        "title": "Amount",
        "oneOf": [{ "type": "integer" }, { "type": "number" }]
    }));
    let options = value.options(Target::Wasm32);
    let mut dest = vec![0u8; 256];
    let out = deflate(&value.blob, b"1e2", &mut dest, &options)?;
    let data = Arena::read_only(&dest[..]);
    let (name, payload) = value.reader(Target::Wasm32, &data).root(out.root)?.variant()?;
    assert_eq!((name, payload.as_f64()?), ("number", 100.0));

    let count = Compiled::new(json!({ "type": "integer" }));
    let options = count.options(Target::Wasm32);
    let mut dest = vec![0u8; 64];
    let err = deflate(&count.blob, b"1e2", &mut dest, &options).unwrap_err();
    assert_snapshot!(err.to_string(), @"Expected integer but found number at /");
    Ok(())
}

#[test]
fn map_keys_with_colliding_hashes_stay_apart() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let map = Compiled::new(json!({ "type": "object", "additionalProperties": { "type": "integer" } }));
    let options = map.options(Target::Wasm32);
    let mut dest = vec![0u8; 512];
    let doc = br#"{"plumless": 1, "other": 2, "buckeroo": 3}"#;
    let out = deflate(&map.blob, doc, &mut dest, &options)?;

    let data = Arena::read_only(&dest[..]);
    let root = map.reader(Target::Wasm32, &data).root(out.root)?;
    assert_eq!(root.len()?, 3);
    for (key, expected) in [("plumless", 1), ("other", 2), ("buckeroo", 3)] {
        let value = root.map_get(key)?.expect("key present");
        assert_eq!(value.as_i64()?, expected, "{key}");
    }
    Ok(())
}

#[test]
fn recursive_types_follow_pointers() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let list = Compiled::new(json!({
        "$ref": "#/$defs/Node",
        "$defs": {
            "Node": {
                "type": "object",
                "properties": {
                    "value": { "type": "integer" },
                    "next": { "$ref": "#/$defs/Node" }
                },
                "required": ["value"]
            }
        }
    }));
    let options = list.options(Target::Wasm32);
    let doc = json!({ "value": 1, "next": { "value": 2, "next": { "value": 3 } } });
    let (data, out) = deflate_owned(
        &list.blob,
        &serde_json::to_vec(&doc).unwrap(),
        ArenaConfig::default(),
        &options,
    )?;

    let mut node = list.reader(Target::Wasm32, &data).root(out.root)?;
    let mut seen = Vec::new();
    loop {
        seen.push(node.field("value")?.as_i64()?);
        match node.field("next")?.option()? {
            Some(next) => node = next,
            None => break,
        }
    }
    assert_eq!(seen, [1, 2, 3]);
    Ok(())
}

#[test]
fn arrays_hold_their_elements() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let tags = Compiled::new(json!({ "type": "array", "items": { "type": "string" } }));
    let options = tags.options(Target::Wasm32);
    let (data, out) = deflate_owned(&tags.blob, br#"["a", "bc", ""]"#, ArenaConfig::default(), &options)?;
    let root = tags.reader(Target::Wasm32, &data).root(out.root)?;
    let items: Vec<&str> = root
        .elements()?
        .iter()
        .map(|e| e.as_str())
        .collect::<Result<_, _>>()?;
    assert_eq!(items, ["a", "bc", ""]);

    let (data, out) = deflate_owned(&tags.blob, b"[]", ArenaConfig::default(), &options)?;
    let root = tags.reader(Target::Wasm32, &data).root(out.root)?;
    assert!(root.is_empty()?);
    Ok(())
}

#[test]
fn nesting_deeper_than_the_limit_is_a_violation() {
    deflate_testhelpers::setup();
    let grid = Compiled::new(json!({
        "type": "array",
        "items": { "type": "array", "items": { "type": "integer" } }
    }));
    let options = grid.options(Target::Wasm32).max_depth(1);
    let err = deflate_owned(&grid.blob, b"[[1]]", ArenaConfig::default(), &options).unwrap_err();
    assert!(matches!(
        err.violation().map(|v| &v.kind),
        Some(ViolationKind::TooDeep { max_depth: 1 })
    ));
    assert_snapshot!(err.to_string(), @"Nesting deeper than 1 levels at /0");

    let ok = deflate_owned(&grid.blob, b"[[1]]", ArenaConfig::default(), &grid.options(Target::Wasm32));
    assert!(ok.is_ok());
    assert!(matches!(
        deflate_owned(&grid.blob, b"[1]", ArenaConfig::default(), &grid.options(Target::Wasm32)),
        Err(DeflateError::Validation(_))
    ));
}
