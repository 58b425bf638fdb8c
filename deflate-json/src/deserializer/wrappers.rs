use alloc::string::ToString;

use deflate_core::{FieldDef, Offset, SchemaError, TypeDef};
use serde_json::Value;

use super::Deserializer;
use crate::DeflateError;

impl Deserializer<'_, '_, '_> {
    /// The `(tag, first payload, second payload)` fields of an `Option` or
    /// `Result` instance, payloads picked by activation value.
    fn wrapper_fields(&self, def: &TypeDef) -> Result<[FieldDef; 3], DeflateError> {
        let fields = self.schema.fields_in_order(def)?;
        let by_activation = |value: u8| {
            fields
                .iter()
                .skip(1)
                .find(|f| f.activation_value == value)
                .copied()
        };
        match (fields.first(), by_activation(0), by_activation(1)) {
            (Some(tag), Some(first), Some(second)) => Ok([*tag, first, second]),
            _ => Err(SchemaError::Malformed {
                type_name: self.schema.name(def).into(),
                message: "wrapper without two activation values".into(),
            }
            .into()),
        }
    }

    fn write_tag(&mut self, dest: Offset, def: &TypeDef, tag: &FieldDef, value: u8) -> Result<(), DeflateError> {
        let tag_ty = self.schema.ty(self.schema.field_type(def, tag)?)?;
        self.write_uint(Self::at(dest, tag.offset)?, tag_ty.size, u64::from(value))
    }

    /// `null` selects `None`; anything else is the `Some` payload.
    pub(super) fn option(&mut self, def: &TypeDef, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let [tag, none, some] = self.wrapper_fields(def)?;
        if json.is_null() {
            return self.write_tag(dest, def, &tag, none.activation_value);
        }
        self.write_tag(dest, def, &tag, some.activation_value)?;
        let ty = self.schema.field_type(def, &some)?;
        self.value(ty, Self::at(dest, some.offset)?, json)
    }

    /// Tries the `Ok` payload; a validation error inside it is stored as the
    /// `Err` message instead of failing the document.
    pub(super) fn result(&mut self, def: &TypeDef, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let [tag, ok, err] = self.wrapper_fields(def)?;
        let mark = self.violations.len();
        let ok_ty = self.schema.field_type(def, &ok)?;
        match self.value(ok_ty, Self::at(dest, ok.offset)?, json) {
            Ok(()) => self.write_tag(dest, def, &tag, ok.activation_value),
            Err(DeflateError::Validation(violation)) => {
                self.violations.truncate(mark);
                let message = violation.to_string();
                debug!(%message, "captured by fallible field");

                let payload = Self::at(dest, err.offset)?;
                self.data
                    .zero(payload, def.size.saturating_sub(err.offset) as usize)?;
                self.write_tag(dest, def, &tag, err.activation_value)?;
                let err_def = self.schema.ty(self.schema.field_type(def, &err)?)?;
                self.write_string(&err_def, payload, &message)
            }
            Err(e) => Err(e),
        }
    }
}
