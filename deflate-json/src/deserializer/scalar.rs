use alloc::string::ToString;

use deflate_core::{Offset, TypeDef};
use serde_json::Value;

use super::Deserializer;
use crate::{DeflateError, ViolationKind};

impl Deserializer<'_, '_, '_> {
    pub(super) fn integer(&mut self, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Value::Number(n) = json else {
            return Err(self.mismatch("integer", json));
        };
        if n.is_f64() {
            return Err(self.mismatch("integer", json));
        }
        let Some(v) = n.as_i64() else {
            return Err(self.violation(ViolationKind::NumberOutOfRange {
                value: n.to_string(),
                target_type: "integer",
            }));
        };
        self.write_uint(dest, 8, v as u64)
    }

    /// Integer-shaped numbers widen.
    pub(super) fn number(&mut self, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Some(v) = json.as_f64() else {
            return Err(self.mismatch("number", json));
        };
        self.write_uint(dest, 8, v.to_bits())
    }

    pub(super) fn boolean(&mut self, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Value::Bool(b) = json else {
            return Err(self.mismatch("boolean", json));
        };
        self.write_uint(dest, 1, u64::from(*b))
    }

    /// A single byte, written as a one-byte string.
    pub(super) fn char(&mut self, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        match json {
            Value::String(s) if s.len() == 1 => self.write_uint(dest, 1, u64::from(s.as_bytes()[0])),
            _ => Err(self.mismatch("char", json)),
        }
    }

    /// Pointer, size, hash and tag values given as plain non-negative integers.
    pub(super) fn unsigned(&mut self, width: u32, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Some(v) = json.as_u64() else {
            return Err(self.mismatch("integer", json));
        };
        let max = match width {
            8.. => u64::MAX,
            w => (1u64 << (w * 8)) - 1,
        };
        if v > max {
            return Err(self.violation(ViolationKind::NumberOutOfRange {
                value: v.to_string(),
                target_type: "unsigned",
            }));
        }
        self.write_uint(dest, width, v)
    }

    pub(super) fn unit(&mut self, json: &Value) -> Result<(), DeflateError> {
        if json.is_null() {
            Ok(())
        } else {
            Err(self.mismatch("null", json))
        }
    }

    pub(super) fn string(&mut self, def: &TypeDef, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Value::String(s) = json else {
            return Err(self.mismatch("string", json));
        };
        self.write_string(def, dest, s)
    }

    /// Writes `s` as a `String`: `len` bytes plus a NUL terminator, with
    /// `cap` counting the terminator.
    pub(super) fn write_string(&mut self, def: &TypeDef, dest: Offset, s: &str) -> Result<(), DeflateError> {
        let layout = self.schema.array_layout(def)?;
        let storage = self.data.store_str(s)?;
        self.write_pointer(Self::at(dest, layout.ptr)?, storage)?;
        self.write_size(Self::at(dest, layout.cap)?, s.len() + 1)?;
        self.write_size(Self::at(dest, layout.len)?, s.len())
    }
}

#[cfg(test)]
mod tests {
    use deflate_core::{Arena, ArenaConfig, Builtin, LayoutCompiler, SchemaBuilder, Target};
    use serde_json::json;

    use super::*;

    fn run(builtin: Builtin, json: Value) -> (Result<Offset, DeflateError>, Vec<u8>) {
        let mut b = SchemaBuilder::new(ArenaConfig::default()).unwrap();
        let ctx = b.init_context(Target::Wasm32).unwrap();
        LayoutCompiler::new(&mut b, ctx, Target::Wasm32)
            .arrange_all()
            .unwrap();
        let mut data = Arena::owned(ArenaConfig::fixed(64)).unwrap();
        let result = Deserializer::new(b.schema(), ctx, Target::Wasm32, &mut data)
            .deserialize_root(ctx.builtin(builtin), &json);
        (result, data.to_vec())
    }

    #[test]
    fn integers_reject_decimals() {
        deflate_testhelpers::setup();
        let (at, bytes) = run(Builtin::Integer, json!(-2));
        let at = at.unwrap().as_usize();
        assert_eq!(&bytes[at..at + 8], &(-2i64).to_le_bytes());

        let (err, _) = run(Builtin::Integer, json!(2.5));
        assert_eq!(
            err.unwrap_err().to_string(),
            "Expected integer but found number at /"
        );

        let (err, _) = run(Builtin::Integer, json!(u64::MAX));
        assert!(matches!(
            err.unwrap_err().violation().map(|v| &v.kind),
            Some(ViolationKind::NumberOutOfRange { .. })
        ));
    }

    #[test]
    fn numbers_widen_integers() {
        deflate_testhelpers::setup();
        let (at, bytes) = run(Builtin::Number, json!(3));
        let at = at.unwrap().as_usize();
        assert_eq!(&bytes[at..at + 8], &3.0f64.to_bits().to_le_bytes());

        let (err, _) = run(Builtin::Number, json!("3"));
        assert_eq!(
            err.unwrap_err().to_string(),
            "Expected number but found string at /"
        );
    }

    #[test]
    fn strings_are_terminated() {
        deflate_testhelpers::setup();
        let (at, bytes) = run(Builtin::String, json!("héllo"));
        let at = at.unwrap().as_usize();
        let word = |i: usize| u32::from_le_bytes(bytes[at + i..at + i + 4].try_into().unwrap());
        let (ptr, cap, len) = (word(0) as usize, word(4), word(8));
        assert_eq!((cap, len), (7, 6));
        assert_eq!(&bytes[ptr..ptr + 7], "héllo\0".as_bytes());
    }

    #[test]
    fn unit_only_takes_null() {
        deflate_testhelpers::setup();
        assert!(run(Builtin::Unit, json!(null)).0.is_ok());
        assert!(run(Builtin::Unit, json!(false)).0.is_err());
        assert!(run(Builtin::Boolean, json!(true)).0.is_ok());
    }
}
