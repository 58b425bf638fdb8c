//! Creating types in a schema arena, including generic instantiation.

use alloc::format;
use alloc::vec::Vec;
use std::collections::HashMap;

use crate::types::{alloc_record, write_record};
use crate::{
    Arena, ArenaConfig, Builtin, FieldDef, FieldFlags, Offset, Record, Schema, SchemaContext,
    SchemaError, StrRef, Target, TypeClass, TypeDef, TypeFlags, TypeId, debug, name_hash, trace,
};

/// Writes type and field records into an owned schema arena.
///
/// One builder can hold the contexts of both targets: each call to
/// [`SchemaBuilder::init_context`] creates a fresh, independent set of
/// builtin types sized for its target.
#[derive(Debug)]
pub struct SchemaBuilder {
    arena: Arena<'static>,
    /// `(constructor, argument) → instance`, so each generic instance exists once.
    instances: HashMap<(TypeId, TypeId), TypeId>,
}

impl SchemaBuilder {
    /// Starts a builder over a fresh owned arena.
    pub fn new(config: ArenaConfig) -> Result<Self, SchemaError> {
        Ok(Self::with_arena(Arena::owned(config)?))
    }

    /// Starts a builder over an existing writable arena.
    pub fn with_arena(arena: Arena<'static>) -> Self {
        Self {
            arena,
            instances: HashMap::new(),
        }
    }

    /// The schema arena.
    pub fn arena(&self) -> &Arena<'static> {
        &self.arena
    }

    /// Gives up the builder and returns its arena.
    pub fn into_arena(self) -> Arena<'static> {
        self.arena
    }

    /// Read access to what has been built so far.
    pub fn schema(&self) -> Schema<'_> {
        Schema::new(&self.arena)
    }

    /// Decodes the type record `id`.
    pub fn ty(&self, id: TypeId) -> Result<TypeDef, SchemaError> {
        self.schema().ty(id)
    }

    /// Stores a string in the schema arena.
    pub fn str(&mut self, s: &str) -> Result<StrRef, SchemaError> {
        if s.is_empty() {
            return Ok(StrRef::EMPTY);
        }
        let len = u32::try_from(s.len()).map_err(|_| crate::ArenaError::TooLarge {
            requested: s.len(),
        })?;
        Ok(StrRef {
            offset: self.arena.store_str(s)?,
            len,
        })
    }

    /// Allocates a type record.
    pub fn add_type(&mut self, def: &TypeDef) -> Result<TypeId, SchemaError> {
        Ok(TypeId::new(alloc_record(&mut self.arena, def)?))
    }

    /// Allocates a named, fieldless type of `class`.
    pub fn new_type(&mut self, name: &str, class: TypeClass) -> Result<TypeId, SchemaError> {
        let name = self.str(name)?;
        self.add_type(&TypeDef::new(name, class))
    }

    /// Overwrites the type record `id`.
    pub fn write_type(&mut self, id: TypeId, def: &TypeDef) -> Result<(), SchemaError> {
        write_record(&mut self.arena, id.offset(), def)
    }

    /// Applies `f` to the type record `id`.
    pub fn update_type(
        &mut self,
        id: TypeId,
        f: impl FnOnce(&mut TypeDef),
    ) -> Result<TypeDef, SchemaError> {
        let mut def = self.ty(id)?;
        f(&mut def);
        self.write_type(id, &def)?;
        Ok(def)
    }

    /// Builds a field record, storing its name and hash.
    pub fn field(
        &mut self,
        json_name: &str,
        ty: Option<TypeId>,
        order: u32,
    ) -> Result<FieldDef, SchemaError> {
        let name = self.str(json_name)?;
        Ok(FieldDef::new(name, name_hash(json_name), ty, order))
    }

    /// Replaces the field list of `id` with freshly allocated records.
    pub fn set_fields(&mut self, id: TypeId, fields: &[FieldDef]) -> Result<TypeDef, SchemaError> {
        let at = if fields.is_empty() {
            Offset::NULL
        } else {
            self.arena
                .alloc_array(fields.len(), FieldDef::SIZE, FieldDef::ALIGN)?
        };
        let def = self.update_type(id, |def| {
            def.fields = at;
            def.field_count = fields.len() as u32;
        })?;
        self.write_fields(&def, fields)?;
        Ok(def)
    }

    /// Rewrites the existing field records of `def` in place.
    pub fn write_fields(&mut self, def: &TypeDef, fields: &[FieldDef]) -> Result<(), SchemaError> {
        debug_assert_eq!(fields.len(), def.field_count as usize);
        for (i, field) in fields.iter().enumerate() {
            let at = Offset::new(def.fields.get() + (i * FieldDef::SIZE) as u32);
            write_record(&mut self.arena, at, field)?;
        }
        Ok(())
    }

    /// Creates every builtin and generic prototype for `target`.
    pub fn init_context(&mut self, target: Target) -> Result<SchemaContext, SchemaError> {
        let mut ctx = SchemaContext::default();
        let width = target.pointer_width();

        for (builtin, size) in [
            (Builtin::Integer, 8),
            (Builtin::Number, 8),
            (Builtin::Boolean, 1),
            (Builtin::Char, 1),
            (Builtin::Pointer, width),
            (Builtin::Size, width),
            (Builtin::Hash, 4),
            (Builtin::Tag, 1),
            (Builtin::Unit, 0),
        ] {
            let name = self.str(builtin.name())?;
            let id = self.add_type(&TypeDef::scalar(name, size))?;
            ctx.set_builtin(builtin, id);
        }

        let prototype = TypeFlags::BUILTIN | TypeFlags::TYPE_CONSTRUCTOR;

        let array = self.prototype(Builtin::Array, TypeClass::Array, prototype)?;
        let fields = [
            self.field("ptr", Some(ctx.builtin(Builtin::Pointer)), 0)?,
            self.field("cap", Some(ctx.builtin(Builtin::Size)), 1)?,
            self.field("len", Some(ctx.builtin(Builtin::Size)), 2)?,
        ];
        self.set_fields(array, &fields)?;
        ctx.set_builtin(Builtin::Array, array);

        let string = self.type_construct(array, ctx.builtin(Builtin::Char))?;
        let string_name = self.str(Builtin::String.name())?;
        self.update_type(string, |def| {
            def.name = string_name;
            def.flags.insert(TypeFlags::BUILTIN);
        })?;
        ctx.set_builtin(Builtin::String, string);

        let option = self.prototype(Builtin::Option, TypeClass::Variant, prototype)?;
        let fields = [
            self.tag_field(&ctx)?,
            self.wrapper_field("None", Some(ctx.builtin(Builtin::Unit)), 1, 0)?,
            self.wrapper_field("Some", None, 2, 1)?,
        ];
        self.set_fields(option, &fields)?;
        ctx.set_builtin(Builtin::Option, option);

        let result = self.prototype(Builtin::Result, TypeClass::Variant, prototype)?;
        let fields = [
            self.tag_field(&ctx)?,
            self.wrapper_field("Ok", None, 1, 0)?,
            self.wrapper_field("Err", Some(string), 2, 1)?,
        ];
        self.set_fields(result, &fields)?;
        ctx.set_builtin(Builtin::Result, result);

        let map = self.prototype(Builtin::Map, TypeClass::Map, prototype)?;
        let keys = self.type_construct(array, ctx.builtin(Builtin::Hash))?;
        let strings = self.type_construct(array, string)?;
        let fields = [
            self.field("keys", Some(keys), 0)?,
            self.field("values", Some(array), 1)?,
            self.field("strings", Some(strings), 2)?,
        ];
        self.set_fields(map, &fields)?;
        ctx.set_builtin(Builtin::Map, map);

        let struct_proto = self.prototype(Builtin::StructPrototype, TypeClass::Struct, TypeFlags::BUILTIN)?;
        ctx.set_builtin(Builtin::StructPrototype, struct_proto);
        let variant_proto =
            self.prototype(Builtin::VariantPrototype, TypeClass::Variant, TypeFlags::BUILTIN)?;
        ctx.set_builtin(Builtin::VariantPrototype, variant_proto);

        debug!(%target, used = self.arena.used(), "schema context initialized");
        Ok(ctx)
    }

    fn prototype(
        &mut self,
        builtin: Builtin,
        class: TypeClass,
        flags: TypeFlags,
    ) -> Result<TypeId, SchemaError> {
        let id = self.new_type(builtin.name(), class)?;
        self.update_type(id, |def| def.flags = flags)?;
        Ok(id)
    }

    /// The tag field every variant starts with.
    pub fn tag_field(&mut self, ctx: &SchemaContext) -> Result<FieldDef, SchemaError> {
        self.field("tag", Some(ctx.builtin(Builtin::Tag)), 0)
    }

    fn wrapper_field(
        &mut self,
        name: &str,
        ty: Option<TypeId>,
        order: u32,
        activation: u8,
    ) -> Result<FieldDef, SchemaError> {
        let mut field = self.field(name, ty, order)?;
        field.activation_value = activation;
        field.choice_value = activation;
        Ok(field)
    }

    /// Instantiates the generic `ctor` with `arg`.
    ///
    /// Concrete types are returned unchanged. Otherwise the prototype is
    /// cloned, marked concrete, given `arg` as its `rel_type`, and its fields
    /// rebound: the generic parameter becomes `arg`, nested prototypes are
    /// instantiated with `arg` in turn, and concrete field types are kept.
    pub fn type_construct(&mut self, ctor: TypeId, arg: TypeId) -> Result<TypeId, SchemaError> {
        let proto = self.ty(ctor)?;
        if !proto.is_type_constructor() {
            return Ok(ctor);
        }
        if let Some(&existing) = self.instances.get(&(ctor, arg)) {
            return Ok(existing);
        }

        let arg_def = self.ty(arg)?;
        let name = {
            let schema = self.schema();
            format!("{}<{}>", schema.name(&proto), schema.name(&arg_def))
        };
        let mut def = proto;
        def.name = self.str(&name)?;
        def.flags.remove(TypeFlags::TYPE_CONSTRUCTOR);
        def.flags.remove(TypeFlags::BUILTIN);
        def.type_ctor = Some(ctor);
        def.rel_type = Some(arg);
        def.fields = Offset::NULL;
        def.field_count = 0;
        let id = self.add_type(&def)?;
        // registered before the fields so self-referential prototypes terminate
        self.instances.insert((ctor, arg), id);

        let mut fields = self.schema().fields(&proto)?;
        for field in &mut fields {
            field.ty = Some(match field.ty {
                None => arg,
                Some(ty) => self.type_construct(ty, arg)?,
            });
        }
        self.set_fields(id, &fields)?;
        trace!(%name, %id, "instantiated generic type");
        Ok(id)
    }

    /// `Result<ty, String>`.
    pub fn turn_into_result_type(
        &mut self,
        ctx: &SchemaContext,
        ty: TypeId,
    ) -> Result<TypeId, SchemaError> {
        self.type_construct(ctx.builtin(Builtin::Result), ty)
    }

    /// `Option<ty>`.
    pub fn option_of(&mut self, ctx: &SchemaContext, ty: TypeId) -> Result<TypeId, SchemaError> {
        self.type_construct(ctx.builtin(Builtin::Option), ty)
    }

    /// `Array<ty>`.
    pub fn array_of(&mut self, ctx: &SchemaContext, ty: TypeId) -> Result<TypeId, SchemaError> {
        self.type_construct(ctx.builtin(Builtin::Array), ty)
    }

    /// `Map<ty>`.
    pub fn map_of(&mut self, ctx: &SchemaContext, ty: TypeId) -> Result<TypeId, SchemaError> {
        self.type_construct(ctx.builtin(Builtin::Map), ty)
    }

    /// The type a field of declared type `ty` is stored as: fallible fields
    /// become `Result<ty, String>`, then non-required fields become `Option<_>`.
    pub fn wrap_field_type(
        &mut self,
        ctx: &SchemaContext,
        ty: TypeId,
        flags: FieldFlags,
    ) -> Result<TypeId, SchemaError> {
        let mut ty = ty;
        if flags.contains(FieldFlags::CAN_FAIL) {
            ty = self.turn_into_result_type(ctx, ty)?;
        }
        if !flags.contains(FieldFlags::REQUIRED) {
            ty = self.option_of(ctx, ty)?;
        }
        Ok(ty)
    }

    /// A new, empty user struct.
    pub fn new_struct(&mut self, ctx: &SchemaContext, name: &str) -> Result<TypeId, SchemaError> {
        self.new_user_type(ctx, name, TypeClass::Struct, Builtin::StructPrototype)
    }

    /// A new, empty user variant.
    pub fn new_variant(&mut self, ctx: &SchemaContext, name: &str) -> Result<TypeId, SchemaError> {
        self.new_user_type(ctx, name, TypeClass::Variant, Builtin::VariantPrototype)
    }

    fn new_user_type(
        &mut self,
        ctx: &SchemaContext,
        name: &str,
        class: TypeClass,
        proto: Builtin,
    ) -> Result<TypeId, SchemaError> {
        let id = self.new_type(name, class)?;
        self.update_type(id, |def| def.type_ctor = Some(ctx.builtin(proto)))?;
        Ok(id)
    }

    /// Sets the document root of `ctx`, optionally restricted to the subtree
    /// at JSON pointer `slice`.
    pub fn set_root(
        &mut self,
        ctx: &mut SchemaContext,
        root: TypeId,
        slice: Option<&str>,
    ) -> Result<(), SchemaError> {
        ctx.root = Some(root);
        ctx.slice = match slice {
            Some(path) => self.str(path)?,
            None => StrRef::EMPTY,
        };
        Ok(())
    }

    /// Every generic instance created so far.
    pub fn instances(&self) -> Vec<TypeId> {
        let mut all: Vec<TypeId> = self.instances.values().copied().collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> (SchemaBuilder, SchemaContext) {
        let mut b = SchemaBuilder::new(ArenaConfig::default()).unwrap();
        let ctx = b.init_context(Target::Wasm32).unwrap();
        (b, ctx)
    }

    #[test]
    fn concrete_types_construct_to_themselves() {
        deflate_testhelpers::setup();
        let (mut b, ctx) = builder();
        let int = ctx.builtin(Builtin::Integer);
        let s = ctx.builtin(Builtin::String);
        assert_eq!(b.type_construct(int, s).unwrap(), int);
    }

    #[test]
    fn option_instance_binds_its_parameter() {
        deflate_testhelpers::setup();
        let (mut b, ctx) = builder();
        let int = ctx.builtin(Builtin::Integer);
        let opt = b.option_of(&ctx, int).unwrap();
        assert_eq!(b.option_of(&ctx, int).unwrap(), opt);

        let schema = b.schema();
        let def = schema.ty(opt).unwrap();
        assert_eq!(schema.name(&def), "Option<integer>");
        assert!(!def.is_type_constructor());
        assert_eq!(def.type_ctor, Some(ctx.builtin(Builtin::Option)));
        assert_eq!(def.rel_type, Some(int));

        let fields = schema.fields(&def).unwrap();
        assert_eq!(fields[1].ty, Some(ctx.builtin(Builtin::Unit)));
        assert_eq!(fields[1].activation_value, 0);
        assert_eq!(fields[2].ty, Some(int));
        assert_eq!(fields[2].activation_value, 1);
    }

    #[test]
    fn map_instance_rebinds_nested_prototypes() {
        deflate_testhelpers::setup();
        let (mut b, ctx) = builder();
        let num = ctx.builtin(Builtin::Number);
        let map = b.map_of(&ctx, num).unwrap();
        let values = b.array_of(&ctx, num).unwrap();

        let schema = b.schema();
        let fields = schema.fields(&schema.ty(map).unwrap()).unwrap();
        let keys = schema.ty(fields[0].ty.unwrap()).unwrap();
        assert_eq!(keys.rel_type, Some(ctx.builtin(Builtin::Hash)));
        assert_eq!(fields[1].ty, Some(values));
        let strings = schema.ty(fields[2].ty.unwrap()).unwrap();
        assert_eq!(strings.rel_type, Some(ctx.builtin(Builtin::String)));
    }

    #[test]
    fn fallible_wraps_before_optional() {
        deflate_testhelpers::setup();
        let (mut b, ctx) = builder();
        let int = ctx.builtin(Builtin::Integer);
        let ty = b.wrap_field_type(&ctx, int, FieldFlags::CAN_FAIL).unwrap();
        let schema = b.schema();
        assert_eq!(
            schema.name(&schema.ty(ty).unwrap()),
            "Option<Result<integer>>"
        );

        let required = b
            .wrap_field_type(&ctx, int, FieldFlags::REQUIRED)
            .unwrap();
        assert_eq!(required, int);
    }

    #[test]
    fn string_is_an_array_of_char() {
        deflate_testhelpers::setup();
        let (b, ctx) = builder();
        let schema = b.schema();
        let def = schema.ty(ctx.builtin(Builtin::String)).unwrap();
        assert_eq!(schema.name(&def), "String");
        assert_eq!(def.class, TypeClass::Array);
        assert_eq!(def.rel_type, Some(ctx.builtin(Builtin::Char)));
        assert!(def.is_builtin());
    }
}
