use deflate_core::{Builtin, FieldDef, Offset, SchemaError, TypeClass, TypeDef, TypeId};
use serde_json::Value;

use super::Deserializer;
use crate::DeflateError;
use crate::error::kind_of;

/// The JSON shape a variant alternative accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accepts {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Map,
    Object,
}

impl Deserializer<'_, '_, '_> {
    /// What JSON shape a payload of type `ty` takes, if any.
    ///
    /// `Option`, `Result` and nested variants are not candidates: their
    /// shape is ambiguous.
    fn accepts(&self, ty: TypeId) -> Result<Option<Accepts>, DeflateError> {
        if let Some(builtin) = self.ctx.builtin_of(ty) {
            return Ok(match builtin {
                Builtin::Unit => Some(Accepts::Null),
                Builtin::Boolean => Some(Accepts::Boolean),
                Builtin::Integer => Some(Accepts::Integer),
                Builtin::Number => Some(Accepts::Number),
                Builtin::String => Some(Accepts::String),
                _ => None,
            });
        }
        let def = self.schema.ty(ty)?;
        Ok(match def.class {
            TypeClass::Array => Some(Accepts::Array),
            TypeClass::Map => Some(Accepts::Map),
            TypeClass::Struct => Some(Accepts::Object),
            TypeClass::Variant => None,
        })
    }

    /// Picks the alternative for `json`: maps win over objects, and integers
    /// win over numbers unless the number has a fractional part.
    fn choose(&self, def: &TypeDef, json: &Value) -> Result<Option<FieldDef>, DeflateError> {
        let mut by_shape: [Option<FieldDef>; 8] = [None; 8];
        for field in self.schema.fields_in_order(def)?.into_iter().skip(1) {
            let ty = self.schema.field_type(def, &field)?;
            if let Some(shape) = self.accepts(ty)? {
                by_shape[shape as usize].get_or_insert(field);
            }
        }
        let pick = |shape: Accepts| by_shape[shape as usize];
        Ok(match json {
            Value::Null => pick(Accepts::Null),
            Value::Bool(_) => pick(Accepts::Boolean),
            Value::Number(n) if n.is_f64() => pick(Accepts::Number).or(pick(Accepts::Integer)),
            Value::Number(_) => pick(Accepts::Integer).or(pick(Accepts::Number)),
            Value::String(_) => pick(Accepts::String),
            Value::Array(_) => pick(Accepts::Array),
            Value::Object(_) => pick(Accepts::Map).or(pick(Accepts::Object)),
        })
    }

    /// Writes the chosen alternative's `choice_value` as the tag, then its payload.
    pub(super) fn variant(&mut self, def: &TypeDef, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Some(chosen) = self.choose(def, json)? else {
            return Err(SchemaError::NoVariantCandidate {
                type_name: self.schema.name(def).into(),
                kind: kind_of(json),
            }
            .into());
        };
        let fields = self.schema.fields_in_order(def)?;
        let tag = fields[0];
        let tag_def = self.schema.ty(self.schema.field_type(def, &tag)?)?;
        self.write_uint(
            Self::at(dest, tag.offset)?,
            tag_def.size,
            u64::from(chosen.choice_value),
        )?;
        let ty = self.schema.field_type(def, &chosen)?;
        self.value(ty, Self::at(dest, chosen.offset)?, json)
    }
}
