//! Text schema → type records, for both targets.

use alloc::borrow::ToOwned;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::collections::{HashMap, HashSet};

use deflate_core::{
    ArenaConfig, Builtin, Container, FieldDef, FieldFlags, Metadata, SchemaBuilder, SchemaContext,
    Target, TypeFlags, TypeId, arrange_context,
};
use serde_json::{Map, Value};

use crate::ident::{pascal_case, snake_case};
use crate::{CompileError, schema_hash};

/// Settings for [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Name of the root type when the schema has no `title`.
    pub root_name: String,
    /// Arena the schema is built in.
    pub arena: ArenaConfig,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            root_name: "Root".into(),
            arena: ArenaConfig::default(),
        }
    }
}

impl CompileOptions {
    /// Sets the root type name.
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Sets the schema arena configuration.
    pub fn arena(mut self, config: ArenaConfig) -> Self {
        self.arena = config;
        self
    }
}

/// Compiles a JSON-Schema shaped document into a container holding the
/// layouts of both targets and their schema hash.
///
/// Supported: `type` (`object`, `array`, `string`, `integer`, `number`,
/// `boolean`, `null`), `properties`, `required`, `items`,
/// `additionalProperties` (maps), `oneOf`/`anyOf` (variants), `$ref` into
/// `$defs` or `definitions`, and `title`. Extensions: `x-can-fail`,
/// `x-by-reference`, `x-non-exhaustive` and, on the root, `x-slice`.
pub fn compile(schema: &Value, options: &CompileOptions) -> Result<Container<'static>, CompileError> {
    let slice = match schema.get("x-slice") {
        None => None,
        Some(Value::String(path)) if path.is_empty() || path.starts_with('/') => Some(path.as_str()),
        Some(_) => {
            return Err(CompileError::invalid(
                "/x-slice",
                "expected a JSON pointer string",
            ));
        }
    };

    let mut builder = SchemaBuilder::new(options.arena)?;
    let wasm = compile_target(&mut builder, schema, options, slice, Target::Wasm32)?;
    let native = compile_target(&mut builder, schema, options, slice, Target::Native)?;

    let mut container = Container {
        metadata: Metadata::default(),
        wasm,
        native,
        arena: builder.into_arena(),
    };
    container.metadata.schema_hash = schema_hash(&container)?;
    debug!(
        schema_hash = container.metadata.schema_hash,
        arena = container.arena.used(),
        "schema compiled"
    );
    Ok(container)
}

fn compile_target(
    builder: &mut SchemaBuilder,
    schema: &Value,
    options: &CompileOptions,
    slice: Option<&str>,
    target: Target,
) -> Result<SchemaContext, CompileError> {
    let mut ctx = builder.init_context(target)?;
    let root = Compiler::new(builder, ctx, schema).node(schema, "", &options.root_name)?;
    builder.set_root(&mut ctx, root, slice)?;
    arrange_context(builder, &ctx, target)?;
    debug!(%target, "target compiled");
    Ok(ctx)
}

/// Compiles schema nodes into the types of one context.
struct Compiler<'b, 'v> {
    builder: &'b mut SchemaBuilder,
    ctx: SchemaContext,
    document: &'v Value,
    /// Compiled definitions, by `$ref` string.
    defs: HashMap<&'v str, TypeId>,
    /// Definitions whose compilation has started but not finished.
    in_progress: HashSet<&'v str>,
    names: HashSet<String>,
}

impl<'b, 'v> Compiler<'b, 'v> {
    fn new(builder: &'b mut SchemaBuilder, ctx: SchemaContext, document: &'v Value) -> Self {
        Self {
            builder,
            ctx,
            document,
            defs: HashMap::new(),
            in_progress: HashSet::new(),
            names: HashSet::new(),
        }
    }

    fn node(&mut self, node: &'v Value, pointer: &str, name: &str) -> Result<TypeId, CompileError> {
        self.named_node(node, pointer, name, None)
    }

    /// Compiles `node`; `def` is the `$ref` string when `node` is a definition.
    fn named_node(
        &mut self,
        node: &'v Value,
        pointer: &str,
        name: &str,
        def: Option<&'v str>,
    ) -> Result<TypeId, CompileError> {
        let Value::Object(obj) = node else {
            return Err(CompileError::invalid(pointer, "expected a schema object"));
        };
        if let Some(reference) = obj.get("$ref") {
            return self.reference(reference, pointer);
        }
        let title = match obj.get("title") {
            Some(Value::String(title)) => title.as_str(),
            _ => name,
        };
        for keyword in ["oneOf", "anyOf"] {
            if let Some(alternatives) = obj.get(keyword) {
                return self.variant(obj, alternatives, &child(pointer, keyword), title, def);
            }
        }

        let kind = match obj.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            Some(_) => return Err(CompileError::invalid(pointer, "\"type\" must be a string")),
            None if obj.contains_key("properties") || obj.contains_key("additionalProperties") => {
                "object"
            }
            None => return Err(CompileError::invalid(pointer, "missing \"type\"")),
        };
        let builtin = match kind {
            "object" => return self.object(obj, pointer, title, def),
            "array" => {
                let items = obj
                    .get("items")
                    .ok_or_else(|| CompileError::invalid(pointer, "array without \"items\""))?;
                let element = self.node(items, &child(pointer, "items"), &format!("{title}Item"))?;
                return Ok(self.builder.array_of(&self.ctx, element)?);
            }
            "string" => Builtin::String,
            "integer" => Builtin::Integer,
            "number" => Builtin::Number,
            "boolean" => Builtin::Boolean,
            "null" => Builtin::Unit,
            other => {
                return Err(CompileError::invalid(
                    pointer,
                    format!("unsupported type \"{other}\""),
                ));
            }
        };
        Ok(self.ctx.builtin(builtin))
    }

    /// Resolves `#/$defs/Name` or `#/definitions/Name`. A definition reached
    /// again while it is being compiled becomes stored by reference.
    fn reference(&mut self, reference: &'v Value, pointer: &str) -> Result<TypeId, CompileError> {
        let Some(reference) = reference.as_str() else {
            return Err(CompileError::invalid(pointer, "\"$ref\" must be a string"));
        };
        let Some(name) = reference
            .strip_prefix("#/$defs/")
            .or_else(|| reference.strip_prefix("#/definitions/"))
        else {
            return Err(CompileError::invalid(
                pointer,
                format!("unsupported $ref \"{reference}\""),
            ));
        };

        if let Some(&id) = self.defs.get(reference) {
            if self.in_progress.contains(reference) {
                self.builder
                    .update_type(id, |def| def.flags.insert(TypeFlags::STORED_BY_REFERENCE))?;
                trace!(reference, "recursive definition stored by reference");
            }
            return Ok(id);
        }
        if self.in_progress.contains(reference) {
            return Err(CompileError::invalid(
                pointer,
                format!("recursive definition \"{name}\" must be an object or a variant"),
            ));
        }

        let target_pointer = &reference[1..];
        let document = self.document;
        let target = document.pointer(target_pointer).ok_or_else(|| {
            CompileError::invalid(pointer, format!("unknown $ref \"{reference}\""))
        })?;
        self.in_progress.insert(reference);
        let id = self.named_node(target, target_pointer, name, Some(reference))?;
        self.in_progress.remove(reference);
        self.defs.insert(reference, id);
        Ok(id)
    }

    fn object(
        &mut self,
        obj: &'v Map<String, Value>,
        pointer: &str,
        name: &str,
        def: Option<&'v str>,
    ) -> Result<TypeId, CompileError> {
        let properties = obj.get("properties");
        if properties.is_none()
            && let Some(values @ Value::Object(_)) = obj.get("additionalProperties")
        {
            let value = self.node(
                values,
                &child(pointer, "additionalProperties"),
                &format!("{name}Value"),
            )?;
            return Ok(self.builder.map_of(&self.ctx, value)?);
        }

        let name = self.unique_name(name);
        let id = self.builder.new_struct(&self.ctx, &name)?;
        self.register(def, id);
        self.apply_type_flags(obj, id)?;

        let required = required_names(obj, pointer)?;
        let mut idents = HashSet::new();
        let mut fields = Vec::new();
        if let Some(properties) = properties {
            let Value::Object(properties) = properties else {
                return Err(CompileError::invalid(
                    &child(pointer, "properties"),
                    "expected an object",
                ));
            };
            let base = child(pointer, "properties");
            for (order, (field_name, field_schema)) in properties.iter().enumerate() {
                let at = child(&base, field_name);
                let ty = self.node(field_schema, &at, &format!("{name}{}", pascal_case(field_name)))?;
                let mut flags = FieldFlags::empty();
                flags.set(FieldFlags::REQUIRED, required.contains(&field_name.as_str()));
                flags.set(FieldFlags::CAN_FAIL, is_set(field_schema, "x-can-fail"));
                let stored = self.builder.wrap_field_type(&self.ctx, ty, flags)?;
                let mut field = self.builder.field(field_name, Some(stored), order as u32)?;
                field.flags = flags;
                self.companion_name(&mut field, field_name, snake_case(field_name), &mut idents)?;
                fields.push(field);
            }
        }
        self.builder.set_fields(id, &fields)?;
        trace!(%name, fields = fields.len(), "struct compiled");
        Ok(id)
    }

    fn variant(
        &mut self,
        obj: &'v Map<String, Value>,
        alternatives: &'v Value,
        pointer: &str,
        name: &str,
        def: Option<&'v str>,
    ) -> Result<TypeId, CompileError> {
        let Value::Array(alternatives) = alternatives else {
            return Err(CompileError::invalid(pointer, "expected an array of schemas"));
        };
        if alternatives.is_empty() || alternatives.len() > usize::from(u8::MAX) {
            return Err(CompileError::invalid(
                pointer,
                "a variant needs between 1 and 255 alternatives",
            ));
        }

        let name = self.unique_name(name);
        let id = self.builder.new_variant(&self.ctx, &name)?;
        self.register(def, id);
        self.apply_type_flags(obj, id)?;

        let mut idents = HashSet::new();
        let mut fields: Vec<FieldDef> = alloc::vec![self.builder.tag_field(&self.ctx)?];
        for (index, alternative) in alternatives.iter().enumerate() {
            let at = child(pointer, &index.to_string());
            let ty = self.node(alternative, &at, &format!("{name}{index}"))?;
            let label = {
                let schema = self.builder.schema();
                schema.name(&schema.ty(ty)?).to_owned()
            };
            let mut field = self.builder.field(&label, Some(ty), index as u32 + 1)?;
            field.choice_value = index as u8;
            self.companion_name(&mut field, &label, pascal_case(&label), &mut idents)?;
            fields.push(field);
        }
        self.builder.set_fields(id, &fields)?;
        trace!(%name, alternatives = alternatives.len(), "variant compiled");
        Ok(id)
    }

    /// Stores `ident`, made unique among `taken`, as the field's companion
    /// name when it differs from the JSON name.
    fn companion_name(
        &mut self,
        field: &mut FieldDef,
        json_name: &str,
        ident: String,
        taken: &mut HashSet<String>,
    ) -> Result<(), CompileError> {
        let mut unique = ident.clone();
        let mut n = 2;
        while !taken.insert(unique.clone()) {
            unique = format!("{ident}{n}");
            n += 1;
        }
        if unique != json_name {
            field.companion_name = self.builder.str(&unique)?;
        }
        Ok(())
    }

    fn register(&mut self, def: Option<&'v str>, id: TypeId) {
        if let Some(def) = def {
            self.defs.insert(def, id);
        }
    }

    fn apply_type_flags(&mut self, obj: &Map<String, Value>, id: TypeId) -> Result<(), CompileError> {
        let by_reference = obj.get("x-by-reference") == Some(&Value::Bool(true));
        let non_exhaustive = obj.get("x-non-exhaustive") == Some(&Value::Bool(true));
        if by_reference || non_exhaustive {
            self.builder.update_type(id, |def| {
                if by_reference {
                    def.flags.insert(TypeFlags::STORED_BY_REFERENCE);
                }
                if non_exhaustive {
                    def.flags.insert(TypeFlags::NON_EXHAUSTIVE);
                }
            })?;
        }
        Ok(())
    }

    /// `base`, or `base` with a numeric suffix when a type of that name exists.
    fn unique_name(&mut self, base: &str) -> String {
        let mut name = base.to_owned();
        let mut n = 2;
        while !self.names.insert(name.clone()) {
            name = format!("{base}{n}");
            n += 1;
        }
        name
    }
}

fn required_names<'v>(obj: &'v Map<String, Value>, pointer: &str) -> Result<Vec<&'v str>, CompileError> {
    match obj.get("required") {
        None => Ok(Vec::new()),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str().ok_or_else(|| {
                    CompileError::invalid(&child(pointer, "required"), "expected property names")
                })
            })
            .collect(),
        Some(_) => Err(CompileError::invalid(
            &child(pointer, "required"),
            "expected an array",
        )),
    }
}

fn is_set(node: &Value, flag: &str) -> bool {
    node.get(flag) == Some(&Value::Bool(true))
}

/// Appends one escaped JSON pointer segment.
fn child(pointer: &str, segment: &str) -> String {
    format!("{pointer}/{}", segment.replace('~', "~0").replace('/', "~1"))
}
