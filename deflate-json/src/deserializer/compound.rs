use deflate_core::{Offset, SchemaError, TypeDef};
use serde_json::Value;

use super::Deserializer;
use crate::{DeflateError, PathSegment, ViolationKind};

impl Deserializer<'_, '_, '_> {
    /// Fields are matched to members by exact name; unknown members are
    /// ignored and absent optional fields stay zeroed, which reads as `None`.
    pub(super) fn object(&mut self, def: &TypeDef, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Value::Object(members) = json else {
            return Err(self.mismatch("object", json));
        };
        let mut first = None;
        for field in self.schema.fields_in_order(def)? {
            let name = self.schema.str(field.json_name)?;
            let Some(member) = members.get(name) else {
                if field.is_required() {
                    let missing = self.violation(ViolationKind::MissingField {
                        field: name.into(),
                    });
                    Self::gather(&mut first, Err(missing))?;
                }
                continue;
            };
            let ty = self.schema.field_type(def, &field)?;
            let at = Self::at(dest, field.offset)?;
            let result = self.nested(PathSegment::Key(name.into()), |de| de.value(ty, at, member));
            Self::gather(&mut first, result)?;
        }
        first.map_or(Ok(()), Err)
    }

    pub(super) fn array(&mut self, def: &TypeDef, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Value::Array(items) = json else {
            return Err(self.mismatch("array", json));
        };
        let elem = def.rel_type.ok_or_else(|| SchemaError::UnboundParameter {
            type_name: self.schema.name(def).into(),
        })?;
        let storage = self.array_storage(def, dest, items.len())?;
        let stride = self.schema.ty(elem)?.var;

        let mut first = None;
        for (index, item) in items.iter().enumerate() {
            let at = Self::element(storage, index, stride)?;
            let result = self.nested(PathSegment::Index(index), |de| de.value(elem, at, item));
            Self::gather(&mut first, result)?;
        }
        first.map_or(Ok(()), Err)
    }

    /// Allocates zeroed room for `len` elements of the array type `def` and
    /// writes its `{ptr, cap, len}` triple at `dest`. Returns the storage.
    pub(super) fn array_storage(&mut self, def: &TypeDef, dest: Offset, len: usize) -> Result<Offset, DeflateError> {
        let layout = self.schema.array_layout(def)?;
        let storage = if len == 0 {
            Offset::NULL
        } else {
            let elem = def.rel_type.ok_or_else(|| SchemaError::UnboundParameter {
                type_name: self.schema.name(def).into(),
            })?;
            let elem = self.schema.ty(elem)?;
            self.data
                .alloc_array(len, elem.var as usize, elem.align.max(1) as usize)?
        };
        self.write_pointer(Self::at(dest, layout.ptr)?, storage)?;
        self.write_size(Self::at(dest, layout.cap)?, len)?;
        self.write_size(Self::at(dest, layout.len)?, len)?;
        Ok(storage)
    }
}
