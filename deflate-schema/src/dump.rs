//! Human-readable layout listing and the schema hash derived from it.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use deflate_core::{Container, Schema, SchemaContext, SchemaError, Target, TypeDef, TypeFlags, TypeId};

/// Types worth listing: everything reachable from the root except the
/// fieldless builtin scalars.
pub(crate) fn listed_types(schema: Schema<'_>, root: TypeId) -> Result<Vec<(TypeId, TypeDef)>, SchemaError> {
    let mut out = Vec::new();
    for id in schema.reachable(root)? {
        let def = schema.ty(id)?;
        if def.is_builtin() && def.field_count == 0 {
            continue;
        }
        out.push((id, def));
    }
    Ok(out)
}

fn render_context(
    schema: Schema<'_>,
    ctx: &SchemaContext,
    target: Target,
    lines: &mut Vec<String>,
) -> Result<(), SchemaError> {
    let root = schema.root(ctx)?;
    let mut header = format!("{target} root {}", schema.name(&schema.ty(root)?));
    let slice = schema.str(ctx.slice)?;
    if !slice.is_empty() {
        header.push_str(&format!(" slice {slice}"));
    }
    lines.push(header);

    for (_, def) in listed_types(schema, root)? {
        let storage = if def.is_stored_by_reference() {
            "by-reference"
        } else {
            "inline"
        };
        let mut line = format!(
            "{} {} size={} align={} {storage}",
            schema.name(&def),
            def.class.name(),
            def.size,
            def.align
        );
        if def.flags.contains(TypeFlags::NON_EXHAUSTIVE) {
            line.push_str(" non-exhaustive");
        }
        lines.push(line);

        for field in schema.fields_in_order(&def)? {
            let ty = schema.ty(schema.field_type(&def, &field)?)?;
            lines.push(format!(
                "  +{} {}: {} size={} hash={:#010x} act={}",
                field.offset,
                schema.str(field.json_name)?,
                schema.name(&ty),
                ty.var,
                field.hash,
                field.activation_value
            ));
        }
    }
    Ok(())
}

/// Lists the layout of every type reachable from each context's root, wasm32
/// first: name, class, size, alignment and storage mode, then each field's
/// offset, name, type, size, name hash and activation value.
pub fn layout_dump(container: &Container<'_>) -> Result<String, SchemaError> {
    let schema = container.schema();
    let mut lines = Vec::new();
    for target in Target::ALL {
        render_context(schema, container.context(target), target, &mut lines)?;
    }
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

/// CRC-32 of [`layout_dump`]: changes whenever any size, offset, name or
/// storage mode visible to a consumer changes.
pub fn schema_hash(container: &Container<'_>) -> Result<u32, SchemaError> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(layout_dump(container)?.as_bytes());
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{CompileOptions, compile};

    #[test]
    fn dump_lists_both_targets() {
        deflate_testhelpers::setup();
        let schema = json!({
            "title": "Point",
            "type": "object",
            "properties": {
                "x": { "type": "integer" },
                "label": { "type": "string" }
            },
            "required": ["x", "label"]
        });
        let container = compile(&schema, &CompileOptions::default()).unwrap();
        insta::assert_snapshot!(layout_dump(&container).unwrap(), @r"
        wasm32 root Point
        Point struct size=24 align=8 inline
          +0 x: integer size=8 hash=0x8cdc1683 act=0
          +8 label: String size=12 hash=0x0ea750e8 act=0
        String array size=12 align=4 inline
          +0 ptr: pointer size=4 hash=0x5ee81da0 act=0
          +4 cap: size size=4 hash=0x993387b1 act=0
          +8 len: size size=4 hash=0x0c0c38eb act=0
        native root Point
        Point struct size=32 align=8 inline
          +0 x: integer size=8 hash=0x8cdc1683 act=0
          +8 label: String size=24 hash=0x0ea750e8 act=0
        String array size=24 align=8 inline
          +0 ptr: pointer size=8 hash=0x5ee81da0 act=0
          +8 cap: size size=8 hash=0x993387b1 act=0
          +16 len: size size=8 hash=0x0c0c38eb act=0
        ");
    }

    #[test]
    fn hash_tracks_layout_changes() {
        deflate_testhelpers::setup();
        let a = json!({
            "type": "object",
            "properties": { "n": { "type": "integer" } },
            "required": ["n"]
        });
        let b = json!({
            "type": "object",
            "properties": { "n": { "type": "integer" } }
        });
        let options = CompileOptions::default();
        let first = compile(&a, &options).unwrap();
        let again = compile(&a, &options).unwrap();
        let optional = compile(&b, &options).unwrap();

        assert_eq!(first.metadata.schema_hash, again.metadata.schema_hash);
        assert_eq!(first.metadata.schema_hash, schema_hash(&first).unwrap());
        assert_ne!(first.metadata.schema_hash, optional.metadata.schema_hash);
    }

    #[test]
    fn hash_survives_the_container_round_trip() {
        deflate_testhelpers::setup();
        let schema = json!({ "type": "array", "items": { "type": "number" } });
        let container = compile(&schema, &CompileOptions::default()).unwrap();
        let bytes = container.to_bytes().unwrap();
        let read = Container::read(&bytes).unwrap();
        assert_eq!(schema_hash(&read).unwrap(), container.metadata.schema_hash);
    }
}
