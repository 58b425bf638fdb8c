//! Assigns offsets, sizes and alignments to types for one target.

use alloc::vec::Vec;
use std::collections::HashSet;

use crate::{
    Builtin, FieldDef, Offset, SchemaBuilder, SchemaContext, SchemaError, Target, TypeClass, TypeDef,
    TypeFlags, TypeId, align_up, debug, trace,
};

/// Lays out the types of one [`SchemaContext`].
///
/// Arranging is idempotent: fields are always laid out in declaration order
/// and only afterwards re-sorted (by name hash, for structs), so running it
/// again reproduces the same offsets.
pub struct LayoutCompiler<'b> {
    builder: &'b mut SchemaBuilder,
    ctx: SchemaContext,
    target: Target,
    done: HashSet<TypeId>,
    in_progress: HashSet<TypeId>,
    /// Types only referenced through a pointer; arranged after the current one.
    pending: Vec<TypeId>,
}

impl<'b> LayoutCompiler<'b> {
    /// A compiler for the types of `ctx`, built for `target`.
    pub fn new(builder: &'b mut SchemaBuilder, ctx: SchemaContext, target: Target) -> Self {
        Self {
            builder,
            ctx,
            target,
            done: HashSet::new(),
            in_progress: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// Arranges the root type, the builtin string, and everything reachable
    /// from them.
    pub fn arrange_all(&mut self) -> Result<(), SchemaError> {
        if let Some(root) = self.ctx.root {
            self.arrange(root)?;
        }
        for builtin in [Builtin::String, Builtin::Unit] {
            self.arrange(self.ctx.builtin(builtin))?;
        }
        self.drain_pending()?;
        debug!(target = %self.target, types = self.done.len(), "layout complete");
        Ok(())
    }

    /// Arranges `id` and every type it stores inline, then every type it
    /// only points to.
    pub fn arrange_deep(&mut self, id: TypeId) -> Result<TypeDef, SchemaError> {
        let def = self.arrange(id)?;
        self.drain_pending()?;
        Ok(def)
    }

    fn drain_pending(&mut self) -> Result<(), SchemaError> {
        while let Some(next) = self.pending.pop() {
            self.arrange(next)?;
        }
        Ok(())
    }

    /// Arranges one type, recursing into the types it stores inline.
    pub fn arrange(&mut self, id: TypeId) -> Result<TypeDef, SchemaError> {
        let def = self.builder.ty(id)?;
        if self.done.contains(&id) {
            return Ok(def);
        }
        if def.is_type_constructor() || (def.is_builtin() && def.field_count == 0) {
            self.done.insert(id);
            return Ok(def);
        }
        if !self.in_progress.insert(id) {
            return Err(SchemaError::InfiniteSize {
                type_name: self.builder.schema().name(&def).into(),
            });
        }

        let arranged = match def.class {
            TypeClass::Struct => self.arrange_struct(def, true)?,
            TypeClass::Array => {
                let arranged = self.arrange_struct(def, false)?;
                self.defer(def.rel_type);
                arranged
            }
            TypeClass::Map => {
                let arranged = self.arrange_struct(def, false)?;
                self.defer(def.rel_type);
                arranged
            }
            TypeClass::Variant => self.arrange_variant(def)?,
        };
        self.builder.write_type(id, &arranged)?;

        self.in_progress.remove(&id);
        self.done.insert(id);
        trace!(
            name = self.builder.schema().name(&arranged),
            size = arranged.size,
            align = arranged.align,
            "arranged"
        );
        Ok(arranged)
    }

    fn defer(&mut self, ty: Option<TypeId>) {
        if let Some(ty) = ty
            && !self.done.contains(&ty)
        {
            self.pending.push(ty);
        }
    }

    /// `(var, align)` of a variable of type `id`.
    fn variable_layout(&mut self, id: TypeId) -> Result<(u32, u32), SchemaError> {
        let def = self.builder.ty(id)?;
        if def.is_stored_by_reference() {
            if !self.done.contains(&id) && !self.in_progress.contains(&id) {
                self.pending.push(id);
            }
            let width = self.target.pointer_width();
            return Ok((width, width));
        }
        let def = self.arrange(id)?;
        Ok((def.var, def.align.max(1)))
    }

    fn fields(&self, def: &TypeDef) -> Result<Vec<FieldDef>, SchemaError> {
        self.builder.schema().fields_in_order(def)
    }

    fn field_type(&self, def: &TypeDef, field: &FieldDef) -> Result<TypeId, SchemaError> {
        self.builder.schema().field_type(def, field)
    }

    fn too_large(&self, def: &TypeDef) -> SchemaError {
        SchemaError::Malformed {
            type_name: self.builder.schema().name(def).into(),
            message: "layout exceeds the 32-bit size range".into(),
        }
    }

    fn align(&self, def: &TypeDef, value: u32, align: u32) -> Result<u32, SchemaError> {
        align_up(value as usize, align as usize)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.too_large(def))
    }

    /// Sequential layout. With `by_hash`, fields are re-sorted by name hash
    /// once their offsets are fixed and hash collisions are flagged.
    fn arrange_struct(&mut self, mut def: TypeDef, by_hash: bool) -> Result<TypeDef, SchemaError> {
        let mut fields = self.fields(&def)?;
        let mut offset = 0u32;
        let mut align = 1u32;
        for field in &mut fields {
            let ty = self.field_type(&def, field)?;
            let (var, field_align) = self.variable_layout(ty)?;
            offset = self.align(&def, offset, field_align)?;
            field.offset = offset;
            offset = offset
                .checked_add(var)
                .ok_or_else(|| self.too_large(&def))?;
            align = align.max(field_align);
        }
        def.size = self.align(&def, offset, align)?;
        self.finish_sizing(&mut def, align);

        if by_hash {
            fields.sort_by_key(|f| (f.hash, f.original_order));
            let collides = fields.windows(2).any(|pair| pair[0].hash == pair[1].hash);
            def.flags.set(TypeFlags::HAS_HASH_COLLISIONS, collides);
        }
        self.builder.write_fields(&def, &fields)?;
        Ok(def)
    }

    /// Tag at offset 0, every payload at the first offset past the tag that
    /// satisfies the strictest payload alignment.
    fn arrange_variant(&mut self, mut def: TypeDef) -> Result<TypeDef, SchemaError> {
        let mut fields = self.fields(&def)?;
        if fields.len() <= 1 {
            // nothing to choose between: no tag, no payload
            def.fields = Offset::NULL;
            def.field_count = 0;
            def.size = 0;
            self.finish_sizing(&mut def, 1);
            return Ok(def);
        }

        let tag_ty = self.field_type(&def, &fields[0])?;
        let (tag_var, tag_align) = self.variable_layout(tag_ty)?;
        fields[0].offset = 0;

        let mut payload_align = 1u32;
        let mut payload_size = 0u32;
        for field in &fields[1..] {
            let ty = self.field_type(&def, field)?;
            let (var, align) = self.variable_layout(ty)?;
            payload_align = payload_align.max(align);
            payload_size = payload_size.max(var);
        }
        let payload_offset = self.align(&def, tag_var, payload_align)?;
        for field in &mut fields[1..] {
            field.offset = payload_offset;
        }

        let align = tag_align.max(payload_align);
        let end = payload_offset
            .checked_add(payload_size)
            .ok_or_else(|| self.too_large(&def))?;
        def.size = self.align(&def, end, align)?;
        self.finish_sizing(&mut def, align);
        self.builder.write_fields(&def, &fields)?;
        Ok(def)
    }

    /// Derives `var` and `align` from `size` and the natural alignment.
    fn finish_sizing(&self, def: &mut TypeDef, natural_align: u32) {
        if def.is_stored_by_reference() {
            let width = self.target.pointer_width();
            def.var = width;
            def.align = width;
        } else {
            def.var = def.size;
            def.align = natural_align;
        }
    }
}

/// Arranges every type of `ctx` for `target`.
pub fn arrange_context(
    builder: &mut SchemaBuilder,
    ctx: &SchemaContext,
    target: Target,
) -> Result<(), SchemaError> {
    LayoutCompiler::new(builder, *ctx, target).arrange_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArenaConfig, FieldFlags, Schema};

    struct Fixture {
        b: SchemaBuilder,
        ctx: SchemaContext,
    }

    impl Fixture {
        fn new(target: Target) -> Self {
            let mut b = SchemaBuilder::new(ArenaConfig::default()).unwrap();
            let ctx = b.init_context(target).unwrap();
            Self { b, ctx }
        }

        fn builtin(&self, builtin: Builtin) -> TypeId {
            self.ctx.builtin(builtin)
        }

        fn strukt(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId {
            let id = self.b.new_struct(&self.ctx, name).unwrap();
            let defs: Vec<FieldDef> = fields
                .iter()
                .enumerate()
                .map(|(i, (n, ty))| {
                    let mut f = self.b.field(n, Some(*ty), i as u32).unwrap();
                    f.flags = FieldFlags::REQUIRED;
                    f
                })
                .collect();
            self.b.set_fields(id, &defs).unwrap();
            id
        }

        fn arrange(&mut self, id: TypeId, target: Target) -> TypeDef {
            LayoutCompiler::new(&mut self.b, self.ctx, target)
                .arrange_deep(id)
                .unwrap()
        }
    }

    fn check_struct_invariants(schema: Schema<'_>, id: TypeId) {
        let def = schema.ty(id).unwrap();
        let fields = schema.fields(&def).unwrap();
        let mut ranges = Vec::new();
        for f in &fields {
            let ty = schema.ty(f.ty.unwrap()).unwrap();
            assert!(f.offset + ty.var <= def.size);
            assert_eq!(f.offset % ty.align, 0);
            ranges.push((f.offset, f.offset + ty.var));
        }
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlapping fields {ranges:?}");
        }
    }

    #[test]
    fn struct_fields_are_aligned_and_padded() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let (b, i, s) = (
            fx.builtin(Builtin::Boolean),
            fx.builtin(Builtin::Integer),
            fx.builtin(Builtin::String),
        );
        let id = fx.strukt("S", &[("flag", b), ("count", i), ("label", s), ("last", b)]);
        let def = fx.arrange(id, Target::Wasm32);
        // flag@0, count@8, label@16 (12 bytes), last@28, padded to 32
        assert_eq!(def.size, 32);
        assert_eq!(def.align, 8);
        assert_eq!(def.var, 32);

        let schema = fx.b.schema();
        let label = schema.find_field(&def, "label").unwrap().unwrap();
        assert_eq!(label.offset, 16);
        let last = schema.find_field(&def, "last").unwrap().unwrap();
        assert_eq!(last.offset, 28);
        check_struct_invariants(schema, id);
    }

    #[test]
    fn native_layout_differs_for_pointer_fields() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Native);
        let s = fx.builtin(Builtin::String);
        let b = fx.builtin(Builtin::Boolean);
        let id = fx.strukt("S", &[("label", s), ("flag", b)]);
        let def = fx.arrange(id, Target::Native);
        let width = Target::Native.pointer_width();
        assert_eq!(def.size, 3 * width + width);
        assert_eq!(def.align, width);
    }

    #[test]
    fn arrange_is_idempotent() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let (b, n, s) = (
            fx.builtin(Builtin::Boolean),
            fx.builtin(Builtin::Number),
            fx.builtin(Builtin::String),
        );
        let id = fx.strukt("S", &[("zeta", b), ("alpha", n), ("mid", s)]);
        let first = fx.arrange(id, Target::Wasm32);
        let first_fields = fx.b.schema().fields(&first).unwrap();
        let second = fx.arrange(id, Target::Wasm32);
        let second_fields = fx.b.schema().fields(&second).unwrap();
        assert_eq!(first, second);
        assert_eq!(first_fields, second_fields);
    }

    #[test]
    fn fields_are_sorted_by_hash_and_collisions_flagged() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let i = fx.builtin(Builtin::Integer);
        let id = fx.strukt("S", &[("plumless", i), ("other", i), ("buckeroo", i)]);
        let def = fx.arrange(id, Target::Wasm32);
        assert!(def.flags.contains(TypeFlags::HAS_HASH_COLLISIONS));

        let schema = fx.b.schema();
        let fields = schema.fields(&def).unwrap();
        assert!(fields.windows(2).all(|p| p[0].hash <= p[1].hash));

        let plumless = schema.find_field(&def, "plumless").unwrap().unwrap();
        let buckeroo = schema.find_field(&def, "buckeroo").unwrap().unwrap();
        assert_eq!(plumless.offset, 0);
        assert_eq!(buckeroo.offset, 16);
        assert_eq!(schema.find_field(&def, "missing").unwrap(), None);

        let plain = fx.strukt("P", &[("a", i), ("b", i)]);
        let plain = fx.arrange(plain, Target::Wasm32);
        assert!(!plain.flags.contains(TypeFlags::HAS_HASH_COLLISIONS));
    }

    #[test]
    fn variant_payloads_share_one_offset() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let int = fx.builtin(Builtin::Integer);
        let opt = fx.b.option_of(&fx.ctx, int).unwrap();
        let def = fx.arrange(opt, Target::Wasm32);
        assert_eq!(def.size, 16);
        assert_eq!(def.align, 8);

        let schema = fx.b.schema();
        let fields = schema.fields(&def).unwrap();
        assert_eq!(fields[0].offset, 0);
        assert_eq!(fields[1].offset, 8);
        assert_eq!(fields[2].offset, 8);
        for f in &fields[1..] {
            let ty = schema.ty(f.ty.unwrap()).unwrap();
            assert!(ty.var <= def.size - 1);
        }
    }

    #[test]
    fn single_field_variant_collapses() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let id = fx.b.new_variant(&fx.ctx, "Empty").unwrap();
        let tag = fx.b.tag_field(&fx.ctx).unwrap();
        fx.b.set_fields(id, &[tag]).unwrap();
        let def = fx.arrange(id, Target::Wasm32);
        assert_eq!(def.field_count, 0);
        assert_eq!(def.size, 0);
    }

    #[test]
    fn arrays_and_maps_use_struct_sizing() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let int = fx.builtin(Builtin::Integer);
        let arr = fx.b.array_of(&fx.ctx, int).unwrap();
        let map = fx.b.map_of(&fx.ctx, int).unwrap();
        let arr = fx.arrange(arr, Target::Wasm32);
        assert_eq!((arr.size, arr.align), (12, 4));
        let layout = fx.b.schema().array_layout(&arr).unwrap();
        assert_eq!((layout.ptr, layout.cap, layout.len), (0, 4, 8));

        let map = fx.arrange(map, Target::Wasm32);
        assert_eq!((map.size, map.align), (36, 4));
        let layout = fx.b.schema().map_layout(&map).unwrap();
        assert_eq!((layout.keys.0, layout.values.0, layout.strings.0), (0, 12, 24));
    }

    #[test]
    fn inline_recursion_is_rejected_and_references_break_it() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let node = fx.b.new_struct(&fx.ctx, "Node").unwrap();
        let next = fx.b.option_of(&fx.ctx, node).unwrap();
        let value = fx.builtin(Builtin::Integer);
        let fields = [
            fx.b.field("value", Some(value), 0).unwrap(),
            fx.b.field("next", Some(next), 1).unwrap(),
        ];
        fx.b.set_fields(node, &fields).unwrap();

        let err = LayoutCompiler::new(&mut fx.b, fx.ctx, Target::Wasm32)
            .arrange_deep(node)
            .unwrap_err();
        assert!(matches!(err, SchemaError::InfiniteSize { .. }));

        fx.b
            .update_type(node, |d| d.flags.insert(TypeFlags::STORED_BY_REFERENCE))
            .unwrap();
        let def = fx.arrange(node, Target::Wasm32);
        assert_eq!(def.size, 16);
        assert_eq!((def.var, def.align), (4, 4));
        let next = fx.b.schema().ty(next).unwrap();
        assert_eq!(next.size, 8);
    }

    #[test]
    fn arrays_may_contain_their_owner() {
        deflate_testhelpers::setup();
        let mut fx = Fixture::new(Target::Wasm32);
        let node = fx.b.new_struct(&fx.ctx, "Tree").unwrap();
        let children = fx.b.array_of(&fx.ctx, node).unwrap();
        let fields = [fx.b.field("children", Some(children), 0).unwrap()];
        fx.b.set_fields(node, &fields).unwrap();
        let def = fx.arrange(node, Target::Wasm32);
        assert_eq!(def.size, 12);
    }
}
