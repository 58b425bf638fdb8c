use deflate_core::{Arena, ArenaConfig, ArenaError, Target};
use deflate_json::{
    DeflateError, DeflateOptions, DeflateStatus, deflate, deflate_owned, process_document,
};
use deflate_testhelpers::IPanic;
use insta::assert_snapshot;
use serde_json::json;

use crate::common::Compiled;

fn player() -> Compiled {
    Compiled::new(json!({
        "title": "Player",
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["name", "tags"]
    }))
}

const DOC: &[u8] = br#"{"name": "Ann", "tags": ["fast", "tall"]}"#;

#[test]
fn preconditions_must_match_the_schema() {
    deflate_testhelpers::setup();
    let player = player();
    let mut dest = vec![0u8; 256];

    let good = player.options(Target::Wasm32);
    let wrong_hash = DeflateOptions {
        expected_schema_hash: good.expected_schema_hash ^ 1,
        ..good
    };
    let err = deflate(&player.blob, DOC, &mut dest, &wrong_hash).unwrap_err();
    assert!(matches!(err, DeflateError::SchemaMismatch { what: "schema hash", .. }));
    assert_eq!(err.status(), DeflateStatus::SchemaMismatch);
    assert!(!err.is_retryable());

    let wrong_size = DeflateOptions {
        expected_size: good.expected_size + 4,
        ..good
    };
    let err = deflate(&player.blob, DOC, &mut dest, &wrong_size).unwrap_err();
    assert!(matches!(err, DeflateError::SchemaMismatch { what: "root size", .. }));

    let native_size_on_wasm = DeflateOptions {
        expected_size: player.options(Target::Native).expected_size,
        ..good
    };
    assert!(deflate(&player.blob, DOC, &mut dest, &native_size_on_wasm).is_err());
}

#[test]
fn malformed_inputs_have_their_own_status() {
    deflate_testhelpers::setup();
    let player = player();
    let options = player.options(Target::Wasm32);
    let mut dest = vec![0u8; 256];

    let err = deflate(&player.blob, b"{\"name\": ", &mut dest, &options).unwrap_err();
    assert_eq!(err.status(), DeflateStatus::InvalidJson);
    assert_eq!(err.code(), "deflate::invalid_json");

    let err = deflate(b"not a schema container", DOC, &mut dest, &options).unwrap_err();
    assert_eq!(err.status(), DeflateStatus::InvalidBinaryLayout);
}

#[test]
fn small_destinations_can_be_retried() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let player = player();
    let options = player.options(Target::Wasm32);

    let mut small = vec![0u8; 8];
    let err = deflate(&player.blob, DOC, &mut small, &options).unwrap_err();
    assert_eq!(err.status(), DeflateStatus::OutOfTargetMemory);
    assert!(err.is_retryable());

    let mut dest = vec![0u8; 512];
    let out = deflate(&player.blob, DOC, &mut dest, &options)?;
    assert!(out.end <= dest.len());

    let data = Arena::read_only(&dest[..]);
    let root = player.reader(Target::Wasm32, &data).root(out.root)?;
    assert_eq!(root.field("name")?.as_str()?, "Ann");
    assert_eq!(root.field("tags")?.index(1)?.as_str()?, "tall");
    Ok(())
}

#[test]
fn native_pointers_are_buffer_addresses_by_default() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let player = player();
    let options = player.options(Target::Native);
    let mut dest = vec![0u8; 512];
    let out = deflate(&player.blob, DOC, &mut dest, &options)?;
    let base = dest.as_ptr() as u64;

    let data = Arena::read_only(&dest[..]);
    let root = player
        .reader(Target::Native, &data)
        .pointer_base(base)
        .root(out.root)?;
    assert_eq!(root.field("name")?.as_str()?, "Ann");
    assert_eq!(root.field("tags")?.len()?, 2);

    let unbased = player.reader(Target::Native, &data).root(out.root)?;
    assert!(unbased.field("name")?.as_str().is_err());
    Ok(())
}

#[test]
fn explicit_pointer_base_is_applied() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let player = player();
    let options = player.options(Target::Wasm32).pointer_base(0x1_0000);
    let mut dest = vec![0u8; 512];
    let out = deflate(&player.blob, DOC, &mut dest, &options)?;

    let data = Arena::read_only(&dest[..]);
    let root = player
        .reader(Target::Wasm32, &data)
        .pointer_base(0x1_0000)
        .root(out.root)?;
    assert_eq!(root.field("tags")?.index(0)?.as_str()?, "fast");
    Ok(())
}

#[test]
fn slices_select_a_subtree() -> Result<(), IPanic> {
    deflate_testhelpers::setup();
    let totals = Compiled::new(json!({
        "type": "array",
        "items": { "type": "integer" },
        "x-slice": "/data"
    }));
    let options = totals.options(Target::Wasm32);

    let (data, out) = deflate_owned(
        &totals.blob,
        br#"{"meta": "ignored", "data": [3, 4]}"#,
        ArenaConfig::default(),
        &options,
    )?;
    let root = totals.reader(Target::Wasm32, &data).root(out.root)?;
    let values: Vec<i64> = root
        .elements()?
        .iter()
        .map(|e| e.as_i64())
        .collect::<Result<_, _>>()?;
    assert_eq!(values, [3, 4]);

    let err = deflate_owned(&totals.blob, br#"{"meta": 1}"#, ArenaConfig::default(), &options)
        .unwrap_err();
    assert_eq!(err.status(), DeflateStatus::ValidationError);
    assert_snapshot!(err.to_string(), @"Missing document slice at /data");
    Ok(())
}

#[test]
fn status_codes_are_stable() {
    deflate_testhelpers::setup();
    assert_eq!(DeflateStatus::Ok as u8, 0);
    assert_eq!(DeflateStatus::InvalidJson as u8, 1);
    assert_eq!(DeflateStatus::InvalidBinaryLayout as u8, 2);
    assert_eq!(DeflateStatus::OutOfTargetMemory as u8, 3);
    assert_eq!(DeflateStatus::SchemaMismatch as u8, 4);
    assert_eq!(DeflateStatus::ValidationError as u8, 5);
    assert_eq!(DeflateStatus::SchemaError as u8, 6);
    assert_eq!(DeflateStatus::InvalidDestination as u8, 7);
}

#[test]
fn read_only_destinations_are_not_retryable() {
    deflate_testhelpers::setup();
    let player = player();
    let container = &player.container;
    let schema = container.schema();
    let root = schema.root(&container.wasm).unwrap();

    let mut data = Arena::read_only(vec![0u8; 256]);
    let err = process_document(
        &mut data,
        schema,
        &container.wasm,
        Target::Wasm32,
        root,
        &json!({ "name": "Ann", "tags": [] }),
    )
    .unwrap_err();
    assert!(matches!(err, DeflateError::DataArea(ArenaError::ReadOnly)));
    assert_eq!(err.status(), DeflateStatus::InvalidDestination);
    assert!(!err.is_retryable());
    assert_snapshot!(err.to_string(), @"unusable data area: arena is read-only");
}
