use crate::types::{Record, RecordReader, RecordWriter};
use crate::{Offset, SchemaError, StrRef, TypeId};

/// The builtin and generic root types every schema context provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Builtin {
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Number,
    /// One byte, `0` or `1`.
    Boolean,
    /// One byte of string data.
    Char,
    /// Target pointer.
    Pointer,
    /// Target size (unsigned, pointer width).
    Size,
    /// 32-bit name hash, the key type of maps.
    Hash,
    /// One-byte variant tag.
    Tag,
    /// `Array<Char>`, NUL-terminated.
    String,
    /// `Array<T>` prototype.
    Array,
    /// `Option<T>` prototype.
    Option,
    /// `Result<T, String>` prototype.
    Result,
    /// `Map<T>` prototype.
    Map,
    /// Prototype every user struct is derived from.
    StructPrototype,
    /// Prototype every user variant is derived from.
    VariantPrototype,
    /// Zero-sized type (JSON `null`).
    Unit,
}

impl Builtin {
    /// Every builtin, in context-table order.
    pub const ALL: [Builtin; 16] = [
        Builtin::Integer,
        Builtin::Number,
        Builtin::Boolean,
        Builtin::Char,
        Builtin::Pointer,
        Builtin::Size,
        Builtin::Hash,
        Builtin::Tag,
        Builtin::String,
        Builtin::Array,
        Builtin::Option,
        Builtin::Result,
        Builtin::Map,
        Builtin::StructPrototype,
        Builtin::VariantPrototype,
        Builtin::Unit,
    ];

    /// Number of builtins.
    pub const COUNT: usize = Self::ALL.len();

    /// Name given to the builtin's type record.
    pub const fn name(self) -> &'static str {
        match self {
            Builtin::Integer => "integer",
            Builtin::Number => "number",
            Builtin::Boolean => "boolean",
            Builtin::Char => "char",
            Builtin::Pointer => "pointer",
            Builtin::Size => "size",
            Builtin::Hash => "hash",
            Builtin::Tag => "tag",
            Builtin::String => "String",
            Builtin::Array => "Array",
            Builtin::Option => "Option",
            Builtin::Result => "Result",
            Builtin::Map => "Map",
            Builtin::StructPrototype => "struct",
            Builtin::VariantPrototype => "variant",
            Builtin::Unit => "unit",
        }
    }
}

/// Per-target table of builtin types plus the document root.
///
/// Two contexts exist per compiled schema, one per [`Target`](crate::Target);
/// they share nothing but the arena they live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaContext {
    builtins: [Offset; Builtin::COUNT],
    /// Type of the document root (null until compiled).
    pub root: Option<TypeId>,
    /// JSON pointer selecting the subtree the root type applies to; empty
    /// for the whole document.
    pub slice: StrRef,
}

impl Default for SchemaContext {
    fn default() -> Self {
        Self {
            builtins: [Offset::NULL; Builtin::COUNT],
            root: None,
            slice: StrRef::EMPTY,
        }
    }
}

impl SchemaContext {
    /// The type registered for `builtin`.
    #[inline]
    pub fn builtin(&self, builtin: Builtin) -> TypeId {
        TypeId::new(self.builtins[builtin as usize])
    }

    /// Registers the type for `builtin`.
    pub fn set_builtin(&mut self, builtin: Builtin, ty: TypeId) {
        self.builtins[builtin as usize] = ty.offset();
    }

    /// Which builtin `ty` is, if any.
    pub fn builtin_of(&self, ty: TypeId) -> Option<Builtin> {
        let at = ty.offset();
        if at.is_null() {
            return None;
        }
        Builtin::ALL
            .iter()
            .copied()
            .find(|&b| self.builtins[b as usize] == at)
    }

    /// Whether `ty` is `builtin`.
    #[inline]
    pub fn is(&self, ty: TypeId, builtin: Builtin) -> bool {
        self.builtins[builtin as usize] == ty.offset()
    }
}

impl Record for SchemaContext {
    const SIZE: usize = SchemaContext::ENCODED_SIZE;

    fn encode(&self, out: &mut RecordWriter<'_>) {
        for at in self.builtins {
            out.offset(at);
        }
        out.offset(self.root.map_or(Offset::NULL, TypeId::offset));
        out.offset(self.slice.offset);
        out.u32(self.slice.len);
    }

    fn decode(input: &mut RecordReader<'_>, _at: Offset) -> Result<Self, SchemaError> {
        let mut builtins = [Offset::NULL; Builtin::COUNT];
        for slot in &mut builtins {
            *slot = input.offset();
        }
        let root = input.offset().non_null().map(TypeId::new);
        let slice = StrRef {
            offset: input.offset(),
            len: input.u32(),
        };
        Ok(Self {
            builtins,
            root,
            slice,
        })
    }
}

impl SchemaContext {
    /// Size of an encoded context: the builtin table, the root, the slice path.
    pub const ENCODED_SIZE: usize = Builtin::COUNT * 4 + 4 + 8;

    /// Encodes the context into a standalone byte array (container format).
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_SIZE] {
        let mut out = [0u8; Self::ENCODED_SIZE];
        self.encode(&mut RecordWriter::new(&mut out));
        out
    }

    /// Decodes a context from the container format.
    pub fn from_bytes(bytes: &[u8; Self::ENCODED_SIZE]) -> Result<Self, SchemaError> {
        Self::decode(&mut RecordReader::new(bytes), Offset::NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        deflate_testhelpers::setup();
        let mut ctx = SchemaContext::default();
        let int = TypeId::new(Offset::new(40));
        ctx.set_builtin(Builtin::Integer, int);
        assert_eq!(ctx.builtin_of(int), Some(Builtin::Integer));
        assert!(ctx.is(int, Builtin::Integer));
        assert_eq!(ctx.builtin_of(TypeId::new(Offset::new(80))), None);
        assert_eq!(ctx.builtin_of(TypeId::new(Offset::NULL)), None);
    }

    #[test]
    fn context_bytes_round_trip() {
        deflate_testhelpers::setup();
        let mut ctx = SchemaContext::default();
        for (i, b) in Builtin::ALL.iter().enumerate() {
            ctx.set_builtin(*b, TypeId::new(Offset::new(8 + 40 * i as u32)));
        }
        ctx.root = Some(TypeId::new(Offset::new(1000)));
        ctx.slice = StrRef {
            offset: Offset::new(2000),
            len: 6,
        };
        let bytes = ctx.to_bytes();
        assert_eq!(SchemaContext::from_bytes(&bytes).unwrap(), ctx);
    }
}
