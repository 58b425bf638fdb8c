//! In-arena representation of schema types and fields.
//!
//! Types and fields are stored as fixed-size [`Record`]s inside the schema
//! arena and referenced by offset. [`TypeDef`] and [`FieldDef`] are the
//! decoded, host-side copies used while compiling and walking a schema.

use core::fmt;

use crate::bitflags::bitflags;
use crate::{Offset, SchemaError};

mod record;
pub use record::*;

/// Reference to a type record in a schema arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TypeId(Offset);

impl TypeId {
    /// Wraps the offset of a type record.
    #[inline]
    pub const fn new(at: Offset) -> Self {
        Self(at)
    }

    /// Offset of the type record.
    #[inline]
    pub const fn offset(self) -> Offset {
        self.0
    }

    fn encode(id: Option<TypeId>) -> Offset {
        id.map_or(Offset::NULL, TypeId::offset)
    }

    fn decode(at: Offset) -> Option<TypeId> {
        at.non_null().map(TypeId)
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type@{}", self.0)
    }
}

/// A string stored in a schema arena (NUL-terminated, length excludes it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StrRef {
    /// First byte.
    pub offset: Offset,
    /// Length in bytes.
    pub len: u32,
}

impl StrRef {
    /// The empty string, stored nowhere.
    pub const EMPTY: StrRef = StrRef {
        offset: Offset::NULL,
        len: 0,
    };

    fn encode(&self, out: &mut RecordWriter<'_>) {
        out.offset(self.offset);
        out.u32(self.len);
    }

    fn decode(input: &mut RecordReader<'_>) -> Self {
        StrRef {
            offset: input.offset(),
            len: input.u32(),
        }
    }
}

/// The layout family of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeClass {
    /// Fields laid out one after another (also used for scalars, which have no fields).
    Struct = 0,
    /// Tag at offset 0, then mutually exclusive payloads sharing one offset.
    Variant = 1,
    /// `{ptr, cap, len}` triple pointing at out-of-line elements.
    Array = 2,
    /// Three parallel arrays: key hashes, values, key strings.
    Map = 3,
}

impl TypeClass {
    /// Lowercase name, as printed in layout dumps.
    pub const fn name(self) -> &'static str {
        match self {
            TypeClass::Struct => "struct",
            TypeClass::Variant => "variant",
            TypeClass::Array => "array",
            TypeClass::Map => "map",
        }
    }

    fn from_u8(raw: u8, at: Offset) -> Result<Self, SchemaError> {
        Ok(match raw {
            0 => TypeClass::Struct,
            1 => TypeClass::Variant,
            2 => TypeClass::Array,
            3 => TypeClass::Map,
            class => return Err(SchemaError::UnknownClass { at, class }),
        })
    }
}

bitflags! {
    /// Properties of a type.
    pub struct TypeFlags: u8 {
        /// Instances live out of line; fields of this type hold a pointer.
        const STORED_BY_REFERENCE = 1 << 0;
        /// Provided by the schema context rather than the user schema.
        const BUILTIN = 1 << 1;
        /// A generic prototype; instantiate it with [`SchemaBuilder::type_construct`](crate::SchemaBuilder::type_construct).
        const TYPE_CONSTRUCTOR = 1 << 2;
        /// Variant that may gain alternatives later.
        const NON_EXHAUSTIVE = 1 << 3;
        /// Two fields share a name hash; lookups must compare names.
        const HAS_HASH_COLLISIONS = 1 << 4;
    }
}

bitflags! {
    /// Properties of a field.
    pub struct FieldFlags: u8 {
        /// The field must be present in the input.
        const REQUIRED = 1 << 0;
        /// Validation errors inside the field are captured as `Result::Err`.
        const CAN_FAIL = 1 << 1;
    }
}

/// Decoded type record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDef {
    /// Type name.
    pub name: StrRef,
    /// First field record.
    pub fields: Offset,
    /// Number of field records.
    pub field_count: u32,
    /// Generic prototype this type was instantiated from (or the struct /
    /// variant prototype for user types).
    pub type_ctor: Option<TypeId>,
    /// Element or argument type.
    pub rel_type: Option<TypeId>,
    /// In-memory footprint of an instance.
    pub size: u32,
    /// Footprint of a variable of this type: `size`, or the pointer width
    /// when stored by reference.
    pub var: u32,
    /// Alignment of a variable of this type.
    pub align: u32,
    /// Type flags.
    pub flags: TypeFlags,
    /// Layout family.
    pub class: TypeClass,
}

impl TypeDef {
    /// A fieldless, unsized type of the given class.
    pub const fn new(name: StrRef, class: TypeClass) -> Self {
        Self {
            name,
            fields: Offset::NULL,
            field_count: 0,
            type_ctor: None,
            rel_type: None,
            size: 0,
            var: 0,
            align: 1,
            flags: TypeFlags::empty(),
            class,
        }
    }

    /// A builtin scalar of fixed size and alignment.
    pub const fn scalar(name: StrRef, size: u32) -> Self {
        let mut def = Self::new(name, TypeClass::Struct);
        def.size = size;
        def.var = size;
        def.align = if size == 0 { 1 } else { size };
        def.flags = TypeFlags::BUILTIN;
        def
    }

    /// Whether instances live out of line.
    #[inline]
    pub const fn is_stored_by_reference(&self) -> bool {
        self.flags.contains(TypeFlags::STORED_BY_REFERENCE)
    }

    /// Whether this is a generic prototype.
    #[inline]
    pub const fn is_type_constructor(&self) -> bool {
        self.flags.contains(TypeFlags::TYPE_CONSTRUCTOR)
    }

    /// Whether this type is provided by the schema context.
    #[inline]
    pub const fn is_builtin(&self) -> bool {
        self.flags.contains(TypeFlags::BUILTIN)
    }
}

impl Record for TypeDef {
    const SIZE: usize = 40;

    fn encode(&self, out: &mut RecordWriter<'_>) {
        self.name.encode(out);
        out.offset(self.fields);
        out.u32(self.field_count);
        out.offset(TypeId::encode(self.type_ctor));
        out.offset(TypeId::encode(self.rel_type));
        out.u32(self.size);
        out.u32(self.var);
        out.u32(self.align);
        out.u8(self.flags.bits());
        out.u8(self.class as u8);
        out.pad(2);
    }

    fn decode(input: &mut RecordReader<'_>, at: Offset) -> Result<Self, SchemaError> {
        let name = StrRef::decode(input);
        let fields = input.offset();
        let field_count = input.u32();
        let type_ctor = TypeId::decode(input.offset());
        let rel_type = TypeId::decode(input.offset());
        let size = input.u32();
        let var = input.u32();
        let align = input.u32();
        let flags = TypeFlags::from_bits_truncate(input.u8());
        let class = TypeClass::from_u8(input.u8(), at)?;
        input.skip(2);
        Ok(Self {
            name,
            fields,
            field_count,
            type_ctor,
            rel_type,
            size,
            var,
            align,
            flags,
            class,
        })
    }
}

/// Decoded field record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Key of the field in JSON input.
    pub json_name: StrRef,
    /// Identifier used in companion declarations.
    pub companion_name: StrRef,
    /// Declared type; `None` is the parameter of a generic prototype.
    pub ty: Option<TypeId>,
    /// [`name_hash`](crate::name_hash) of `json_name`.
    pub hash: u32,
    /// Byte offset inside the owning type.
    pub offset: u32,
    /// Field flags.
    pub flags: FieldFlags,
    /// Tag value selecting this field in an `Option`/`Result` wrapper.
    pub activation_value: u8,
    /// Tag value selecting this field in a user variant.
    pub choice_value: u8,
    /// Declaration index; layout always walks fields in this order.
    pub original_order: u32,
}

impl FieldDef {
    /// A field of type `ty` at declaration index `order`.
    pub const fn new(json_name: StrRef, hash: u32, ty: Option<TypeId>, order: u32) -> Self {
        Self {
            json_name,
            companion_name: json_name,
            ty,
            hash,
            offset: 0,
            flags: FieldFlags::empty(),
            activation_value: 0,
            choice_value: 0,
            original_order: order,
        }
    }

    /// Whether the field must be present.
    #[inline]
    pub const fn is_required(&self) -> bool {
        self.flags.contains(FieldFlags::REQUIRED)
    }

    /// Whether validation errors inside the field are captured.
    #[inline]
    pub const fn can_fail(&self) -> bool {
        self.flags.contains(FieldFlags::CAN_FAIL)
    }
}

impl Record for FieldDef {
    const SIZE: usize = 36;

    fn encode(&self, out: &mut RecordWriter<'_>) {
        self.json_name.encode(out);
        self.companion_name.encode(out);
        out.offset(TypeId::encode(self.ty));
        out.u32(self.hash);
        out.u32(self.offset);
        out.u32(self.original_order);
        out.u8(self.flags.bits());
        out.u8(self.activation_value);
        out.u8(self.choice_value);
        out.pad(1);
    }

    fn decode(input: &mut RecordReader<'_>, _at: Offset) -> Result<Self, SchemaError> {
        let json_name = StrRef::decode(input);
        let companion_name = StrRef::decode(input);
        let ty = TypeId::decode(input.offset());
        let hash = input.u32();
        let offset = input.u32();
        let original_order = input.u32();
        let flags = FieldFlags::from_bits_truncate(input.u8());
        let activation_value = input.u8();
        let choice_value = input.u8();
        input.skip(1);
        Ok(Self {
            json_name,
            companion_name,
            ty,
            hash,
            offset,
            flags,
            activation_value,
            choice_value,
            original_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arena, ArenaConfig};

    #[test]
    fn type_record_survives_the_arena() {
        deflate_testhelpers::setup();
        let mut arena = Arena::owned(ArenaConfig::fixed(256)).unwrap();
        let mut def = TypeDef::new(
            StrRef {
                offset: Offset::new(9),
                len: 4,
            },
            TypeClass::Map,
        );
        def.rel_type = Some(TypeId::new(Offset::new(64)));
        def.size = 36;
        def.var = 4;
        def.align = 4;
        def.flags = TypeFlags::STORED_BY_REFERENCE | TypeFlags::HAS_HASH_COLLISIONS;

        let at = alloc_record(&mut arena, &def).unwrap();
        let back: TypeDef = read_record(&arena, at).unwrap();
        assert_eq!(back, def);
        assert_eq!(back.type_ctor, None);
    }

    #[test]
    fn unknown_class_is_a_schema_error() {
        deflate_testhelpers::setup();
        let mut bytes = [0u8; 41];
        bytes[1 + 37] = 9;
        let arena = Arena::read_only(&bytes[..]);
        let err = read_record::<TypeDef>(&arena, Offset::new(1)).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownClass {
                at: Offset::new(1),
                class: 9
            }
        );
    }

    #[test]
    fn flags_drop_unknown_bits() {
        deflate_testhelpers::setup();
        let flags = FieldFlags::from_bits_truncate(0xff);
        assert_eq!(flags, FieldFlags::REQUIRED | FieldFlags::CAN_FAIL);
        assert_eq!(format!("{flags:?}"), "{REQUIRED, CAN_FAIL}");
    }
}
