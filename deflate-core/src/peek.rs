//! Reading deflated instances back through their schema.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::{
    Arena, ArenaError, Builtin, FieldDef, Offset, Schema, SchemaContext, SchemaError, Target,
    TypeClass, TypeDef, TypeId,
};

/// Errors raised while reading an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeekError {
    /// The schema itself could not be read.
    Schema(SchemaError),
    /// The instance bytes could not be read.
    Arena(ArenaError),
    /// The value was accessed as something it is not.
    WrongShape {
        /// What the caller asked for.
        expected: &'static str,
        /// Name of the actual type.
        found: String,
    },
    /// A struct has no field of that name.
    NoSuchField {
        /// The field name asked for.
        name: String,
    },
    /// An array index past the length.
    IndexOutOfBounds {
        /// The index asked for.
        index: usize,
        /// The array length.
        len: usize,
    },
    /// A variant tag selects no alternative.
    InvalidTag {
        /// The tag read.
        tag: u8,
    },
    /// A pointer below the pointer base, or beyond the offset space.
    BadPointer {
        /// The raw pointer value.
        raw: u64,
    },
    /// String bytes are not UTF-8.
    InvalidUtf8,
}

impl PeekError {
    /// Stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            PeekError::Schema(_) => "peek::schema",
            PeekError::Arena(_) => "peek::arena",
            PeekError::WrongShape { .. } => "peek::wrong_shape",
            PeekError::NoSuchField { .. } => "peek::no_such_field",
            PeekError::IndexOutOfBounds { .. } => "peek::index_out_of_bounds",
            PeekError::InvalidTag { .. } => "peek::invalid_tag",
            PeekError::BadPointer { .. } => "peek::bad_pointer",
            PeekError::InvalidUtf8 => "peek::invalid_utf8",
        }
    }
}

impl fmt::Display for PeekError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeekError::Schema(e) => write!(f, "{e}"),
            PeekError::Arena(e) => write!(f, "{e}"),
            PeekError::WrongShape { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            PeekError::NoSuchField { name } => write!(f, "no field named {name:?}"),
            PeekError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            PeekError::InvalidTag { tag } => write!(f, "tag {tag} selects no alternative"),
            PeekError::BadPointer { raw } => write!(f, "pointer {raw:#x} is outside the data"),
            PeekError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
        }
    }
}

impl core::error::Error for PeekError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            PeekError::Schema(e) => Some(e),
            PeekError::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for PeekError {
    fn from(e: SchemaError) -> Self {
        PeekError::Schema(e)
    }
}

impl From<ArenaError> for PeekError {
    fn from(e: ArenaError) -> Self {
        PeekError::Arena(e)
    }
}

/// Everything needed to interpret instance bytes: the schema, the context
/// of the target they were written for, and how pointers were encoded.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    schema: Schema<'a>,
    ctx: SchemaContext,
    target: Target,
    data: &'a Arena<'a>,
    pointer_base: u64,
}

impl<'a> Reader<'a> {
    /// A reader for `data`, written for `target` with pointers relative to 0.
    pub fn new(schema: Schema<'a>, ctx: SchemaContext, target: Target, data: &'a Arena<'a>) -> Self {
        Self {
            schema,
            ctx,
            target,
            data,
            pointer_base: 0,
        }
    }

    /// Sets the value pointers were offset by when written.
    pub fn pointer_base(mut self, base: u64) -> Self {
        self.pointer_base = base;
        self
    }

    /// The schema.
    pub fn schema(&self) -> Schema<'a> {
        self.schema
    }

    /// The context instances are interpreted with.
    pub fn context(&self) -> &SchemaContext {
        &self.ctx
    }

    /// The root instance starting at `at`. The root is always written
    /// inline, even when its type is stored by reference elsewhere.
    pub fn root(&self, at: Offset) -> Result<Peek<'a>, PeekError> {
        let root = self.schema.root(&self.ctx)?;
        self.instance(root, at)
    }

    /// The instance of `ty` starting at `at`.
    pub fn instance(&self, ty: TypeId, at: Offset) -> Result<Peek<'a>, PeekError> {
        Ok(Peek {
            reader: *self,
            ty,
            def: self.schema.ty(ty)?,
            at,
        })
    }

    /// The instance of `ty` whose variable starts at `at`, following the
    /// pointer when `ty` is stored by reference.
    pub fn variable(&self, ty: TypeId, at: Offset) -> Result<Peek<'a>, PeekError> {
        let def = self.schema.ty(ty)?;
        if !def.is_stored_by_reference() {
            return Ok(Peek {
                reader: *self,
                ty,
                def,
                at,
            });
        }
        let at = self
            .read_pointer(at)?
            .ok_or(PeekError::Arena(ArenaError::NullOffset))?;
        Ok(Peek {
            reader: *self,
            ty,
            def,
            at,
        })
    }

    fn bytes(&self, at: Offset, len: usize) -> Result<&'a [u8], PeekError> {
        if len == 0 {
            return Ok(&[]);
        }
        Ok(self.data.slice(at, len)?)
    }

    fn read_uint(&self, at: Offset, width: u32) -> Result<u64, PeekError> {
        let bytes = self.bytes(at, width as usize)?;
        Ok(self.target.read_uint(bytes))
    }

    /// Decodes a pointer variable; `None` for null.
    fn read_pointer(&self, at: Offset) -> Result<Option<Offset>, PeekError> {
        let raw = self.read_uint(at, self.target.pointer_width())?;
        if raw == 0 {
            return Ok(None);
        }
        let offset = raw
            .checked_sub(self.pointer_base)
            .and_then(|o| u32::try_from(o).ok())
            .ok_or(PeekError::BadPointer { raw })?;
        Ok(Some(Offset::new(offset)))
    }

    fn read_size(&self, at: Offset) -> Result<usize, PeekError> {
        let raw = self.read_uint(at, self.target.pointer_width())?;
        usize::try_from(raw).map_err(|_| PeekError::BadPointer { raw })
    }
}

/// A typed view of one instance inside deflated data.
#[derive(Clone, Copy)]
pub struct Peek<'a> {
    reader: Reader<'a>,
    ty: TypeId,
    def: TypeDef,
    at: Offset,
}

impl fmt::Debug for Peek<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peek")
            .field("type", &self.name())
            .field("at", &self.at)
            .finish()
    }
}

impl<'a> Peek<'a> {
    /// The type of the instance.
    pub fn ty(&self) -> TypeId {
        self.ty
    }

    /// The decoded type record.
    pub fn def(&self) -> &TypeDef {
        &self.def
    }

    /// Where the instance starts in the data.
    pub fn offset(&self) -> Offset {
        self.at
    }

    /// Name of the instance's type.
    pub fn name(&self) -> &'a str {
        self.reader.schema.name(&self.def)
    }

    /// Which builtin the instance is, if any.
    pub fn builtin(&self) -> Option<Builtin> {
        self.reader.ctx.builtin_of(self.ty)
    }

    /// The raw instance bytes.
    pub fn bytes(&self) -> Result<&'a [u8], PeekError> {
        self.reader.bytes(self.at, self.def.size as usize)
    }

    fn wrong(&self, expected: &'static str) -> PeekError {
        PeekError::WrongShape {
            expected,
            found: self.name().into(),
        }
    }

    fn expect_builtin(&self, builtin: Builtin, expected: &'static str) -> Result<(), PeekError> {
        if self.builtin() == Some(builtin) {
            Ok(())
        } else {
            Err(self.wrong(expected))
        }
    }

    fn at(&self, delta: u32) -> Result<Offset, PeekError> {
        self.at
            .checked_add(delta)
            .ok_or(PeekError::Arena(ArenaError::TooLarge {
                requested: delta as usize,
            }))
    }

    /// Reads an `integer`.
    pub fn as_i64(&self) -> Result<i64, PeekError> {
        self.expect_builtin(Builtin::Integer, "integer")?;
        Ok(self.reader.read_uint(self.at, 8)? as i64)
    }

    /// Reads a `number`.
    pub fn as_f64(&self) -> Result<f64, PeekError> {
        self.expect_builtin(Builtin::Number, "number")?;
        Ok(f64::from_bits(self.reader.read_uint(self.at, 8)?))
    }

    /// Reads a `boolean`.
    pub fn as_bool(&self) -> Result<bool, PeekError> {
        self.expect_builtin(Builtin::Boolean, "boolean")?;
        Ok(self.reader.read_uint(self.at, 1)? != 0)
    }

    /// Whether this is the zero-sized `unit`.
    pub fn is_unit(&self) -> bool {
        self.builtin() == Some(Builtin::Unit)
    }

    /// Reads a `String`.
    pub fn as_str(&self) -> Result<&'a str, PeekError> {
        self.expect_builtin(Builtin::String, "string")?;
        let (ptr, len) = self.array_parts()?;
        let Some(ptr) = ptr else {
            return Ok("");
        };
        let bytes = self.reader.bytes(ptr, len)?;
        core::str::from_utf8(bytes).map_err(|_| PeekError::InvalidUtf8)
    }

    /// Looks up a struct field by name.
    pub fn field(&self, name: &str) -> Result<Peek<'a>, PeekError> {
        if self.def.class != TypeClass::Struct {
            return Err(self.wrong("struct"));
        }
        let field = self
            .reader
            .schema
            .find_field(&self.def, name)?
            .ok_or_else(|| PeekError::NoSuchField { name: name.into() })?;
        self.enter(&field)
    }

    /// Every field of a struct, in declaration order.
    pub fn fields(&self) -> Result<Vec<(&'a str, Peek<'a>)>, PeekError> {
        if self.def.class != TypeClass::Struct {
            return Err(self.wrong("struct"));
        }
        let schema = self.reader.schema;
        schema
            .fields_in_order(&self.def)?
            .iter()
            .map(|f| Ok((schema.str(f.json_name)?, self.enter(f)?)))
            .collect()
    }

    fn enter(&self, field: &FieldDef) -> Result<Peek<'a>, PeekError> {
        let ty = self.reader.schema.field_type(&self.def, field)?;
        self.reader.variable(ty, self.at(field.offset)?)
    }

    fn tag(&self) -> Result<u8, PeekError> {
        Ok(self.reader.read_uint(self.at, 1)? as u8)
    }

    /// The selected alternative of a variant: its JSON name and payload.
    pub fn variant(&self) -> Result<(&'a str, Peek<'a>), PeekError> {
        if self.def.class != TypeClass::Variant {
            return Err(self.wrong("variant"));
        }
        let tag = self.tag()?;
        let schema = self.reader.schema;
        let fields = schema.fields_in_order(&self.def)?;
        let field = fields
            .iter()
            .skip(1)
            .find(|f| f.choice_value == tag)
            .ok_or(PeekError::InvalidTag { tag })?;
        Ok((schema.str(field.json_name)?, self.enter(field)?))
    }

    fn wrapper(&self, ctor: Builtin) -> Result<(&'a str, Peek<'a>), PeekError> {
        let is_instance = self
            .def
            .type_ctor
            .is_some_and(|c| self.reader.ctx.is(c, ctor));
        if !is_instance {
            return Err(self.wrong(ctor.name()));
        }
        let tag = self.tag()?;
        let schema = self.reader.schema;
        let fields = schema.fields_in_order(&self.def)?;
        let field = fields
            .iter()
            .skip(1)
            .find(|f| f.activation_value == tag)
            .ok_or(PeekError::InvalidTag { tag })?;
        Ok((schema.str(field.json_name)?, self.enter(field)?))
    }

    /// Reads an `Option<T>`.
    pub fn option(&self) -> Result<Option<Peek<'a>>, PeekError> {
        let (name, payload) = self.wrapper(Builtin::Option)?;
        Ok((name != "None").then_some(payload))
    }

    /// Reads a `Result<T, String>`; the error is the stored message.
    pub fn result(&self) -> Result<Result<Peek<'a>, &'a str>, PeekError> {
        let (name, payload) = self.wrapper(Builtin::Result)?;
        if name == "Err" {
            Ok(Err(payload.as_str()?))
        } else {
            Ok(Ok(payload))
        }
    }

    fn array_parts(&self) -> Result<(Option<Offset>, usize), PeekError> {
        let layout = self.reader.schema.array_layout(&self.def)?;
        let ptr = self.reader.read_pointer(self.at(layout.ptr)?)?;
        let len = self.reader.read_size(self.at(layout.len)?)?;
        Ok((ptr, len))
    }

    /// Number of elements of an array.
    pub fn len(&self) -> Result<usize, PeekError> {
        match self.def.class {
            TypeClass::Array => Ok(self.array_parts()?.1),
            TypeClass::Map => {
                let layout = self.reader.schema.map_layout(&self.def)?;
                let keys = self.reader.variable(layout.keys.1, self.at(layout.keys.0)?)?;
                keys.len()
            }
            _ => Err(self.wrong("array or map")),
        }
    }

    /// Whether an array or map is empty.
    pub fn is_empty(&self) -> Result<bool, PeekError> {
        Ok(self.len()? == 0)
    }

    /// Element `index` of an array.
    pub fn index(&self, index: usize) -> Result<Peek<'a>, PeekError> {
        if self.def.class != TypeClass::Array {
            return Err(self.wrong("array"));
        }
        let (ptr, len) = self.array_parts()?;
        let ptr = match ptr {
            Some(ptr) if index < len => ptr,
            _ => return Err(PeekError::IndexOutOfBounds { index, len }),
        };
        let elem = self
            .def
            .rel_type
            .ok_or_else(|| self.reader.schema.malformed(&self.def, "array without element type"))?;
        let stride = self.reader.schema.ty(elem)?.var as usize;
        let delta = index
            .checked_mul(stride)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or(PeekError::IndexOutOfBounds { index, len })?;
        let at = ptr
            .checked_add(delta)
            .ok_or(PeekError::IndexOutOfBounds { index, len })?;
        self.reader.variable(elem, at)
    }

    /// Every element of an array.
    pub fn elements(&self) -> Result<Vec<Peek<'a>>, PeekError> {
        (0..self.len()?).map(|i| self.index(i)).collect()
    }

    fn map_arrays(&self) -> Result<[Peek<'a>; 3], PeekError> {
        if self.def.class != TypeClass::Map {
            return Err(self.wrong("map"));
        }
        let layout = self.reader.schema.map_layout(&self.def)?;
        Ok([
            self.reader.variable(layout.keys.1, self.at(layout.keys.0)?)?,
            self.reader.variable(layout.values.1, self.at(layout.values.0)?)?,
            self.reader.variable(layout.strings.1, self.at(layout.strings.0)?)?,
        ])
    }

    /// Looks up a map value by key.
    ///
    /// Keys are sorted by hash: binary search finds the run of equal hashes,
    /// then the stored key strings decide.
    pub fn map_get(&self, key: &str) -> Result<Option<Peek<'a>>, PeekError> {
        let [keys, values, strings] = self.map_arrays()?;
        let hashes = read_hashes(&keys)?;
        let hash = crate::name_hash(key);
        let start = hashes.partition_point(|&h| h < hash);
        for (i, _) in hashes.iter().enumerate().skip(start).take_while(|(_, h)| **h == hash) {
            if strings.index(i)?.as_str()? == key {
                return Ok(Some(values.index(i)?));
            }
        }
        Ok(None)
    }

    /// Every `(key, value)` pair of a map, in hash order.
    pub fn map_entries(&self) -> Result<Vec<(&'a str, Peek<'a>)>, PeekError> {
        let [keys, values, strings] = self.map_arrays()?;
        (0..keys.len()?)
            .map(|i| Ok((strings.index(i)?.as_str()?, values.index(i)?)))
            .collect()
    }
}

fn read_hashes(keys: &Peek<'_>) -> Result<Vec<u32>, PeekError> {
    let (ptr, len) = keys.array_parts()?;
    let Some(ptr) = ptr else {
        return Ok(Vec::new());
    };
    let size = len
        .checked_mul(4)
        .ok_or(PeekError::IndexOutOfBounds { index: len, len })?;
    let bytes = keys.reader.bytes(ptr, size)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| keys.reader.target.read_uint(c) as u32)
        .collect())
}
