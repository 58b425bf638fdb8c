//! Read-only view over the type records of a schema arena.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::types::read_record;
use crate::{Arena, FieldDef, SchemaContext, SchemaError, StrRef, TypeClass, TypeDef, TypeId};

/// Offsets of the `{ptr, cap, len}` triple inside an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayLayout {
    /// Offset of the element pointer.
    pub ptr: u32,
    /// Offset of the capacity.
    pub cap: u32,
    /// Offset of the length.
    pub len: u32,
}

/// Offsets and types of the three parallel arrays inside a map type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapLayout {
    /// `Array<hash>` of sorted key hashes.
    pub keys: (u32, TypeId),
    /// `Array<T>` of values, parallel to `keys`.
    pub values: (u32, TypeId),
    /// `Array<String>` of original keys, parallel to `keys`.
    pub strings: (u32, TypeId),
}

/// Borrowed, read-only access to the types in a schema arena.
#[derive(Clone, Copy)]
pub struct Schema<'a> {
    arena: &'a Arena<'a>,
}

impl core::fmt::Debug for Schema<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Schema").field("arena", self.arena).finish()
    }
}

impl<'a> Schema<'a> {
    /// Views the records stored in `arena`.
    pub fn new(arena: &'a Arena<'a>) -> Self {
        Self { arena }
    }

    /// The underlying arena.
    pub fn arena(&self) -> &'a Arena<'a> {
        self.arena
    }

    /// Decodes the type record `id`.
    pub fn ty(&self, id: TypeId) -> Result<TypeDef, SchemaError> {
        if id.offset().is_null() {
            return Err(SchemaError::DanglingType { at: id.offset() });
        }
        read_record(self.arena, id.offset())
    }

    /// Resolves a stored string.
    pub fn str(&self, s: StrRef) -> Result<&'a str, SchemaError> {
        if s.len == 0 {
            return Ok("");
        }
        let bytes = self.arena.slice(s.offset, s.len as usize)?;
        core::str::from_utf8(bytes).map_err(|_| SchemaError::InvalidUtf8 { at: s.offset })
    }

    /// Name of a type, or `"?"` when the name cannot be read (for diagnostics).
    pub fn name(&self, def: &TypeDef) -> &'a str {
        self.str(def.name).unwrap_or("?")
    }

    /// Decodes field `index` of `def`, in storage order.
    pub fn field(&self, def: &TypeDef, index: u32) -> Result<FieldDef, SchemaError> {
        if index >= def.field_count {
            return Err(SchemaError::Malformed {
                type_name: self.name(def).into(),
                message: alloc::format!("field index {index} out of {}", def.field_count),
            });
        }
        let at = def
            .fields
            .checked_add(index * FieldDef::SIZE_U32)
            .ok_or(SchemaError::DanglingType { at: def.fields })?;
        read_record(self.arena, at)
    }

    /// Every field of `def`, in storage order (hash order for arranged structs).
    pub fn fields(&self, def: &TypeDef) -> Result<Vec<FieldDef>, SchemaError> {
        (0..def.field_count).map(|i| self.field(def, i)).collect()
    }

    /// Every field of `def`, in declaration order.
    pub fn fields_in_order(&self, def: &TypeDef) -> Result<Vec<FieldDef>, SchemaError> {
        let mut fields = self.fields(def)?;
        fields.sort_by_key(|f| f.original_order);
        Ok(fields)
    }

    /// The type of `field`, failing on an unbound generic parameter.
    pub fn field_type(&self, owner: &TypeDef, field: &FieldDef) -> Result<TypeId, SchemaError> {
        field.ty.ok_or_else(|| SchemaError::UnboundParameter {
            type_name: self.name(owner).into(),
        })
    }

    /// Finds a struct field by JSON name.
    ///
    /// Arranged struct fields are sorted by name hash: the hash narrows the
    /// search to a run of candidates, and names are compared within the run
    /// so colliding hashes never select the wrong field.
    pub fn find_field(&self, def: &TypeDef, name: &str) -> Result<Option<FieldDef>, SchemaError> {
        let fields = self.fields(def)?;
        if def.class != TypeClass::Struct {
            for field in fields {
                if self.str(field.json_name)? == name {
                    return Ok(Some(field));
                }
            }
            return Ok(None);
        }
        let hash = crate::name_hash(name);
        let start = fields.partition_point(|f| f.hash < hash);
        for field in fields[start..].iter().take_while(|f| f.hash == hash) {
            if self.str(field.json_name)? == name {
                return Ok(Some(*field));
            }
        }
        Ok(None)
    }

    /// Alignment an out-of-line instance of `def` needs: the largest field
    /// alignment, regardless of how variables of the type are stored.
    pub fn instance_align(&self, def: &TypeDef) -> Result<u32, SchemaError> {
        if !def.is_stored_by_reference() {
            return Ok(def.align.max(1));
        }
        let mut align = 1;
        for field in self.fields(def)? {
            let ty = self.ty(self.field_type(def, &field)?)?;
            align = align.max(ty.align);
        }
        Ok(align)
    }

    /// Field offsets of an array type.
    pub fn array_layout(&self, def: &TypeDef) -> Result<ArrayLayout, SchemaError> {
        let fields = self.fields_in_order(def)?;
        match (def.class, fields.as_slice()) {
            (TypeClass::Array, [ptr, cap, len]) => Ok(ArrayLayout {
                ptr: ptr.offset,
                cap: cap.offset,
                len: len.offset,
            }),
            _ => Err(self.malformed(def, "expected an array of {ptr, cap, len}")),
        }
    }

    /// Field offsets and types of a map type.
    pub fn map_layout(&self, def: &TypeDef) -> Result<MapLayout, SchemaError> {
        let fields = self.fields_in_order(def)?;
        match (def.class, fields.as_slice()) {
            (TypeClass::Map, [keys, values, strings]) => Ok(MapLayout {
                keys: (keys.offset, self.field_type(def, keys)?),
                values: (values.offset, self.field_type(def, values)?),
                strings: (strings.offset, self.field_type(def, strings)?),
            }),
            _ => Err(self.malformed(def, "expected a map of {keys, values, strings}")),
        }
    }

    /// Every type reachable from `root` through fields and element types,
    /// depth-first in declaration order, each listed once.
    pub fn reachable(&self, root: TypeId) -> Result<Vec<TypeId>, SchemaError> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut stack = alloc::vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            let def = self.ty(id)?;
            let mut next = Vec::new();
            for field in self.fields_in_order(&def)? {
                if let Some(ty) = field.ty {
                    next.push(ty);
                }
            }
            if let Some(rel) = def.rel_type {
                next.push(rel);
            }
            // reversed so the first field is visited first
            stack.extend(next.into_iter().rev());
        }
        Ok(out)
    }

    /// Root type of `ctx`.
    pub fn root(&self, ctx: &SchemaContext) -> Result<TypeId, SchemaError> {
        ctx.root
            .ok_or(SchemaError::DanglingType {
                at: crate::Offset::NULL,
            })
    }

    pub(crate) fn malformed(&self, def: &TypeDef, message: &str) -> SchemaError {
        SchemaError::Malformed {
            type_name: self.name(def).into(),
            message: message.into(),
        }
    }
}

impl FieldDef {
    pub(crate) const SIZE_U32: u32 = <FieldDef as crate::Record>::SIZE as u32;
}
