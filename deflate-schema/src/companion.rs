//! Rust declarations matching the compiled layouts.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use std::collections::{HashMap, HashSet};

use deflate_core::{
    Builtin, Container, Schema, SchemaContext, SchemaError, Target, TypeClass, TypeDef, TypeId,
};

use crate::dump::listed_types;
use crate::ident::pascal_case;

const PRELUDE: &str = r"#[repr(C)]
pub struct DeflateArray<T> {
    pub ptr: *const T,
    pub cap: usize,
    pub len: usize,
}

pub type DeflateString = DeflateArray<u8>;

#[repr(C)]
pub struct DeflateMap<T> {
    pub keys: DeflateArray<u32>,
    pub values: DeflateArray<T>,
    pub strings: DeflateArray<DeflateString>,
}

#[repr(C, u8)]
pub enum DeflateOption<T> {
    None = 0,
    Some(T) = 1,
}

#[repr(C, u8)]
pub enum DeflateResult<T> {
    Ok(T) = 0,
    Err(DeflateString) = 1,
}";

/// Generates Rust source declaring a `#[repr(C)]` type for every user type
/// reachable from the root, the generic container types they use, a
/// `DeflateRoot` alias, `SCHEMA_HASH`, and size and alignment assertions
/// for both targets gated on `target_pointer_width`.
///
/// Variables of types stored by reference are declared as `*const T`.
pub fn companion_rust(container: &Container<'_>) -> Result<String, SchemaError> {
    let schema = container.schema();
    let ctx = container.context(Target::Wasm32);
    let root = schema.root(ctx)?;
    let mut generator = Generator::new(schema, ctx);
    generator.assign_idents(root)?;

    let mut out = Vec::new();
    out.push("// Generated by deflate-schema; do not edit.".into());
    out.push(String::new());
    out.push(format!(
        "pub const SCHEMA_HASH: u32 = {:#010x};",
        container.metadata.schema_hash
    ));
    out.push(String::new());
    out.push(PRELUDE.into());
    out.push(String::new());
    out.push(format!(
        "pub type DeflateRoot = {};",
        generator.instance_expr(root, &schema.ty(root)?)?
    ));

    for (id, def) in listed_types(schema, root)? {
        if generator.idents.contains_key(&id) {
            out.push(String::new());
            out.push(generator.declaration(id, &def)?);
        }
    }

    for (target, width) in [(Target::Wasm32, 32), (Target::Native, 64)] {
        out.push(String::new());
        out.push(assertions(schema, container.context(target), &generator, width)?);
    }
    let mut source = out.join("\n");
    source.push('\n');
    Ok(source)
}

/// Names user types and renders type expressions for one context.
struct Generator<'a> {
    schema: Schema<'a>,
    ctx: &'a SchemaContext,
    idents: HashMap<TypeId, String>,
}

impl<'a> Generator<'a> {
    fn new(schema: Schema<'a>, ctx: &'a SchemaContext) -> Self {
        Self {
            schema,
            ctx,
            idents: HashMap::new(),
        }
    }

    fn is_user_type(&self, def: &TypeDef) -> bool {
        def.type_ctor.is_some_and(|ctor| {
            self.ctx.is(ctor, Builtin::StructPrototype) || self.ctx.is(ctor, Builtin::VariantPrototype)
        })
    }

    fn assign_idents(&mut self, root: TypeId) -> Result<(), SchemaError> {
        let mut taken: HashSet<String> = [
            "DeflateRoot",
            "DeflateArray",
            "DeflateString",
            "DeflateMap",
            "DeflateOption",
            "DeflateResult",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        for (id, def) in listed_types(self.schema, root)? {
            if !self.is_user_type(&def) {
                continue;
            }
            let base = pascal_case(self.schema.name(&def));
            let mut ident = base.clone();
            let mut n = 2;
            while !taken.insert(ident.clone()) {
                ident = format!("{base}{n}");
                n += 1;
            }
            self.idents.insert(id, ident);
        }
        Ok(())
    }

    /// How a variable of type `id` is declared.
    fn variable_expr(&self, id: TypeId) -> Result<String, SchemaError> {
        let def = self.schema.ty(id)?;
        let inner = self.instance_expr(id, &def)?;
        Ok(if def.is_stored_by_reference() {
            format!("*const {inner}")
        } else {
            inner
        })
    }

    /// How an instance of type `id` is declared.
    fn instance_expr(&self, id: TypeId, def: &TypeDef) -> Result<String, SchemaError> {
        if let Some(builtin) = self.ctx.builtin_of(id) {
            return Ok(match builtin {
                Builtin::Integer => "i64",
                Builtin::Number => "f64",
                Builtin::Boolean => "bool",
                Builtin::Char | Builtin::Tag => "u8",
                Builtin::Pointer | Builtin::Size => "usize",
                Builtin::Hash => "u32",
                Builtin::Unit => "()",
                Builtin::String => "DeflateString",
                _ => {
                    return Err(SchemaError::UnboundParameter {
                        type_name: self.schema.name(def).into(),
                    });
                }
            }
            .into());
        }
        if let Some(ident) = self.idents.get(&id) {
            return Ok(ident.clone());
        }
        let generic = match def.type_ctor {
            Some(ctor) if self.ctx.is(ctor, Builtin::Option) => "DeflateOption",
            Some(ctor) if self.ctx.is(ctor, Builtin::Result) => "DeflateResult",
            _ => match def.class {
                TypeClass::Array => "DeflateArray",
                TypeClass::Map => "DeflateMap",
                TypeClass::Struct | TypeClass::Variant => {
                    return Err(self.schema_malformed(def));
                }
            },
        };
        let arg = def.rel_type.ok_or_else(|| SchemaError::UnboundParameter {
            type_name: self.schema.name(def).into(),
        })?;
        Ok(format!("{generic}<{}>", self.variable_expr(arg)?))
    }

    fn schema_malformed(&self, def: &TypeDef) -> SchemaError {
        SchemaError::Malformed {
            type_name: self.schema.name(def).into(),
            message: "type has no companion declaration".into(),
        }
    }

    fn declaration(&self, id: TypeId, def: &TypeDef) -> Result<String, SchemaError> {
        let ident = self
            .idents
            .get(&id)
            .ok_or_else(|| self.schema_malformed(def))?;
        let fields = self.schema.fields_in_order(def)?;
        let mut lines = Vec::new();
        match def.class {
            TypeClass::Variant if fields.is_empty() => {
                lines.push("#[repr(C)]".into());
                lines.push(format!("pub struct {ident};"));
            }
            TypeClass::Variant => {
                lines.push("#[repr(C, u8)]".into());
                lines.push(format!("pub enum {ident} {{"));
                for field in fields.iter().skip(1) {
                    let ty = self.variable_expr(self.schema.field_type(def, field)?)?;
                    lines.push(format!(
                        "    {}({ty}) = {},",
                        self.schema.str(field.companion_name)?,
                        field.choice_value
                    ));
                }
                lines.push("}".into());
            }
            _ => {
                lines.push("#[repr(C)]".into());
                if fields.is_empty() {
                    lines.push(format!("pub struct {ident};"));
                } else {
                    lines.push(format!("pub struct {ident} {{"));
                    for field in &fields {
                        let ty = self.variable_expr(self.schema.field_type(def, field)?)?;
                        lines.push(format!("    pub {}: {ty},", self.schema.str(field.companion_name)?));
                    }
                    lines.push("}".into());
                }
            }
        }
        Ok(lines.join("\n"))
    }
}

/// Size and alignment assertions for the context of one target. User types
/// are matched to their declarations by name.
fn assertions(
    schema: Schema<'_>,
    ctx: &SchemaContext,
    generator: &Generator<'_>,
    pointer_width: u32,
) -> Result<String, SchemaError> {
    let by_name: HashMap<&str, &str> = generator
        .idents
        .iter()
        .map(|(&id, ident)| Ok((schema.name(&schema.ty(id)?), ident.as_str())))
        .collect::<Result<_, SchemaError>>()?;

    let root = schema.root(ctx)?;
    let root_def = schema.ty(root)?;
    let mut checks = alloc::vec![(
        "DeflateRoot",
        root_def.size,
        schema.instance_align(&root_def)?
    )];
    for (_, def) in listed_types(schema, root)? {
        if let Some(&ident) = by_name.get(schema.name(&def)) {
            checks.push((ident, def.size, schema.instance_align(&def)?));
        }
    }

    let mut lines = alloc::vec![
        format!("#[cfg(target_pointer_width = \"{pointer_width}\")]"),
        "const _: () = {".into(),
    ];
    for (ident, size, align) in checks {
        lines.push(format!("    assert!(core::mem::size_of::<{ident}>() == {size});"));
        lines.push(format!("    assert!(core::mem::align_of::<{ident}>() == {align});"));
    }
    lines.push("};".into());
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{CompileOptions, compile};

    #[test]
    fn structs_and_variants_are_declared() {
        deflate_testhelpers::setup();
        let schema = json!({
            "title": "Event",
            "type": "object",
            "properties": {
                "eventId": { "type": "integer" },
                "payload": {
                    "title": "Payload",
                    "oneOf": [{ "type": "string" }, { "type": "array", "items": { "type": "number" } }]
                },
                "labels": { "type": "object", "additionalProperties": { "type": "boolean" } }
            },
            "required": ["eventId", "payload"]
        });
        let container = compile(&schema, &CompileOptions::default()).unwrap();
        let source = companion_rust(&container).unwrap();

        assert!(source.contains(&format!(
            "pub const SCHEMA_HASH: u32 = {:#010x};",
            container.metadata.schema_hash
        )));
        assert!(source.contains("pub type DeflateRoot = Event;"));
        assert!(source.contains(
            "#[repr(C)]\npub struct Event {\n    pub event_id: i64,\n    pub payload: Payload,\n    pub labels: DeflateOption<DeflateMap<bool>>,\n}"
        ));
        assert!(source.contains(
            "#[repr(C, u8)]\npub enum Payload {\n    String(DeflateString) = 0,\n    ArrayNumber(DeflateArray<f64>) = 1,\n}"
        ));
        assert!(source.contains("#[cfg(target_pointer_width = \"32\")]"));
        assert!(source.contains("#[cfg(target_pointer_width = \"64\")]"));
    }

    #[test]
    fn assertions_follow_each_target() {
        deflate_testhelpers::setup();
        let schema = json!({
            "title": "Named",
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        });
        let container = compile(&schema, &CompileOptions::default()).unwrap();
        let source = companion_rust(&container).unwrap();
        assert!(source.contains(
            "#[cfg(target_pointer_width = \"32\")]\nconst _: () = {\n    assert!(core::mem::size_of::<DeflateRoot>() == 12);"
        ));
        assert!(source.contains(
            "#[cfg(target_pointer_width = \"64\")]\nconst _: () = {\n    assert!(core::mem::size_of::<DeflateRoot>() == 24);"
        ));
        assert!(source.contains("    assert!(core::mem::align_of::<Named>() == 8);"));
    }

    #[test]
    fn recursive_types_point_to_themselves() {
        deflate_testhelpers::setup();
        let schema = json!({
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
        });
        let container = compile(&schema, &CompileOptions::default()).unwrap();
        let source = companion_rust(&container).unwrap();
        assert!(source.contains("    pub next: DeflateOption<*const Node>,"), "{source}");
        assert!(source.contains("    assert!(core::mem::size_of::<Node>() == 16);"));
    }
}
