//! Writes JSON values into a data arena, laid out as the schema dictates.

use alloc::vec::Vec;

use deflate_core::{
    Arena, ArenaError, Builtin, Offset, Schema, SchemaContext, SchemaError, Target, TypeClass,
    TypeDef, TypeId,
};
use serde_json::Value;

use crate::error::kind_of;
use crate::{DeflateError, JsonPath, PathSegment, Violation, ViolationKind};

mod compound;
mod map;
mod scalar;
mod variant;
mod wrappers;

/// Default limit on how deeply documents may nest.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Deserializes JSON documents into one data arena.
///
/// Pointers written into instances are `pointer_base + offset`, with `0`
/// meaning null. For the native target over a caller buffer the base
/// defaults to the buffer's address, which makes the instance directly
/// usable in place; otherwise it defaults to `0`.
pub struct Deserializer<'s, 'd, 'buf> {
    schema: Schema<'s>,
    ctx: SchemaContext,
    target: Target,
    data: &'d mut Arena<'buf>,
    pointer_base: u64,
    max_depth: usize,
    path: JsonPath,
    /// Every violation raised and not captured by a fallible field.
    violations: Vec<Violation>,
}

impl<'s, 'd, 'buf> Deserializer<'s, 'd, 'buf> {
    /// A deserializer writing instances for `target` into `data`.
    pub fn new(
        schema: Schema<'s>,
        ctx: SchemaContext,
        target: Target,
        data: &'d mut Arena<'buf>,
    ) -> Self {
        let pointer_base = match target {
            Target::Native => data.base_address().map_or(0, |a| a as u64),
            Target::Wasm32 => 0,
        };
        Self {
            schema,
            ctx,
            target,
            data,
            pointer_base,
            max_depth: DEFAULT_MAX_DEPTH,
            path: JsonPath::root(),
            violations: Vec::new(),
        }
    }

    /// Overrides the value added to every written pointer.
    pub fn pointer_base(mut self, base: u64) -> Self {
        self.pointer_base = base;
        self
    }

    /// Overrides the nesting limit.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Violations seen by the last call, in document order; the first one is
    /// the error that call returned.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Allocates an instance of `root` and fills it from `json`. Returns the
    /// offset of the instance.
    pub fn deserialize_root(&mut self, root: TypeId, json: &Value) -> Result<Offset, DeflateError> {
        self.violations.clear();
        self.path = JsonPath::root();
        let def = self.schema.ty(root)?;
        let align = self.schema.instance_align(&def)? as usize;
        let at = self.data.alloc(def.size as usize, align)?;
        debug!(
            root = self.schema.name(&def),
            size = def.size,
            target = %self.target,
            "deserializing document"
        );
        self.instance(root, &def, at, json)?;
        Ok(at)
    }

    /// Writes `json` into the variable of type `ty` at `dest`.
    pub(crate) fn value(&mut self, ty: TypeId, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let def = self.schema.ty(ty)?;
        if def.is_stored_by_reference() {
            let align = self.schema.instance_align(&def)? as usize;
            let out_of_line = self.data.alloc(def.size as usize, align)?;
            self.write_pointer(dest, out_of_line)?;
            return self.instance(ty, &def, out_of_line, json);
        }
        self.instance(ty, &def, dest, json)
    }

    /// Writes `json` into the instance of `ty` at `dest`.
    fn instance(
        &mut self,
        ty: TypeId,
        def: &TypeDef,
        dest: Offset,
        json: &Value,
    ) -> Result<(), DeflateError> {
        trace!(ty = self.schema.name(def), path = %self.path, "value");
        if let Some(builtin) = self.ctx.builtin_of(ty) {
            return match builtin {
                Builtin::Integer => self.integer(dest, json),
                Builtin::Number => self.number(dest, json),
                Builtin::Boolean => self.boolean(dest, json),
                Builtin::Char => self.char(dest, json),
                Builtin::Pointer | Builtin::Size | Builtin::Hash | Builtin::Tag => {
                    self.unsigned(def.size, dest, json)
                }
                Builtin::Unit => self.unit(json),
                Builtin::String => self.string(def, dest, json),
                Builtin::Array
                | Builtin::Option
                | Builtin::Result
                | Builtin::Map
                | Builtin::StructPrototype
                | Builtin::VariantPrototype => Err(SchemaError::UnboundParameter {
                    type_name: self.schema.name(def).into(),
                }
                .into()),
            };
        }
        if let Some(ctor) = def.type_ctor {
            if self.ctx.is(ctor, Builtin::Option) {
                return self.option(def, dest, json);
            }
            if self.ctx.is(ctor, Builtin::Result) {
                return self.result(def, dest, json);
            }
        }
        match def.class {
            TypeClass::Struct => self.object(def, dest, json),
            TypeClass::Array => self.array(def, dest, json),
            TypeClass::Map => self.map(def, dest, json),
            TypeClass::Variant => self.variant(def, dest, json),
        }
    }

    /// Runs `f` one level deeper in the document.
    fn nested<R>(
        &mut self,
        segment: PathSegment,
        f: impl FnOnce(&mut Self) -> Result<R, DeflateError>,
    ) -> Result<R, DeflateError> {
        if self.path.depth() >= self.max_depth {
            let max_depth = self.max_depth;
            return Err(self.violation(ViolationKind::TooDeep { max_depth }));
        }
        self.path.push(segment);
        let result = f(self);
        self.path.pop();
        result
    }

    /// Records a violation at the current path.
    fn violation(&mut self, kind: ViolationKind) -> DeflateError {
        let violation = Violation {
            kind,
            path: self.path.clone(),
        };
        debug!(%violation, "validation failed");
        self.violations.push(violation.clone());
        DeflateError::Validation(violation)
    }

    fn mismatch(&mut self, expected: &'static str, json: &Value) -> DeflateError {
        self.violation(ViolationKind::TypeMismatch {
            expected,
            got: kind_of(json),
        })
    }

    /// Keeps the first validation error of a run of siblings and lets the
    /// walk continue; anything else stops it.
    fn gather(first: &mut Option<DeflateError>, result: Result<(), DeflateError>) -> Result<(), DeflateError> {
        match result {
            Err(e @ DeflateError::Validation(_)) => {
                first.get_or_insert(e);
                Ok(())
            }
            other => other,
        }
    }

    fn at(dest: Offset, delta: u32) -> Result<Offset, DeflateError> {
        dest.checked_add(delta).ok_or(DeflateError::OutOfTargetMemory(
            ArenaError::TooLarge {
                requested: delta as usize,
            },
        ))
    }

    fn element(base: Offset, index: usize, stride: u32) -> Result<Offset, DeflateError> {
        let too_large = || {
            DeflateError::OutOfTargetMemory(ArenaError::TooLarge {
                requested: index.saturating_mul(stride as usize),
            })
        };
        let delta = index
            .checked_mul(stride as usize)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(too_large)?;
        base.checked_add(delta).ok_or_else(too_large)
    }

    /// Writes the low `width` bytes of `value` in target byte order.
    fn write_uint(&mut self, dest: Offset, width: u32, value: u64) -> Result<(), DeflateError> {
        if width == 0 {
            return Ok(());
        }
        let out = self.data.slice_mut(dest, width as usize)?;
        self.target.write_uint(out, value);
        Ok(())
    }

    fn read_uint(&self, at: Offset, width: u32) -> Result<u64, DeflateError> {
        let bytes = self.data.slice(at, width as usize)?;
        Ok(self.target.read_uint(bytes))
    }

    /// Writes a size or count at pointer width.
    fn write_size(&mut self, dest: Offset, value: usize) -> Result<(), DeflateError> {
        let value = value as u64;
        if value > self.target.max_pointer() {
            return Err(ArenaError::TooLarge {
                requested: value as usize,
            }
            .into());
        }
        self.write_uint(dest, self.target.pointer_width(), value)
    }

    /// Writes a pointer to `to`, or null.
    fn write_pointer(&mut self, dest: Offset, to: Offset) -> Result<(), DeflateError> {
        let raw = if to.is_null() {
            0
        } else {
            self.pointer_base
                .checked_add(to.get() as u64)
                .filter(|&raw| raw <= self.target.max_pointer())
                .ok_or(ArenaError::TooLarge {
                    requested: to.as_usize(),
                })?
        };
        self.write_uint(dest, self.target.pointer_width(), raw)
    }

    /// Reads back a pointer this deserializer wrote.
    fn read_pointer(&self, at: Offset) -> Result<Option<Offset>, DeflateError> {
        let raw = self.read_uint(at, self.target.pointer_width())?;
        if raw == 0 {
            return Ok(None);
        }
        let offset = raw
            .checked_sub(self.pointer_base)
            .and_then(|o| u32::try_from(o).ok())
            .ok_or(ArenaError::OutOfBounds {
                offset: Offset::NULL,
                len: 0,
            })?;
        Ok(Some(Offset::new(offset)))
    }
}
