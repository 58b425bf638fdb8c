use alloc::vec::Vec;

use deflate_core::{Offset, SchemaError, TypeDef, name_hash};
use serde_json::Value;

use super::Deserializer;
use crate::{DeflateError, PathSegment};

/// Where the three parallel arrays of one map instance live.
struct MapStorage {
    values: Offset,
    value_stride: u32,
    strings: Offset,
    string_stride: u32,
    string_def: TypeDef,
}

impl Deserializer<'_, '_, '_> {
    /// Key hashes are stored sorted; each member goes to the slot of its
    /// hash, the first free one when hashes collide.
    pub(super) fn map(&mut self, def: &TypeDef, dest: Offset, json: &Value) -> Result<(), DeflateError> {
        let Value::Object(members) = json else {
            return Err(self.mismatch("object", json));
        };
        let layout = self.schema.map_layout(def)?;
        let value_ty = def.rel_type.ok_or_else(|| SchemaError::UnboundParameter {
            type_name: self.schema.name(def).into(),
        })?;
        let n = members.len();

        let mut hashes: Vec<u32> = members.keys().map(|k| name_hash(k)).collect();
        hashes.sort_unstable();

        let keys_def = self.schema.ty(layout.keys.1)?;
        let keys = self.array_storage(&keys_def, Self::at(dest, layout.keys.0)?, n)?;
        for (i, hash) in hashes.iter().enumerate() {
            self.write_uint(Self::element(keys, i, 4)?, 4, u64::from(*hash))?;
        }

        let values_def = self.schema.ty(layout.values.1)?;
        let values = self.array_storage(&values_def, Self::at(dest, layout.values.0)?, n)?;
        let strings_def = self.schema.ty(layout.strings.1)?;
        let strings = self.array_storage(&strings_def, Self::at(dest, layout.strings.0)?, n)?;
        let string_ty = strings_def.rel_type.ok_or_else(|| SchemaError::UnboundParameter {
            type_name: self.schema.name(&strings_def).into(),
        })?;
        let string_def = self.schema.ty(string_ty)?;
        let storage = MapStorage {
            values,
            value_stride: self.schema.ty(value_ty)?.var,
            strings,
            string_stride: string_def.var,
            string_def,
        };

        let mut first = None;
        for (key, member) in members {
            let slot = self.map_slot(def, &hashes, &storage, key)?;
            let key_at = Self::element(storage.strings, slot, storage.string_stride)?;
            self.write_string(&storage.string_def, key_at, key)?;

            let value_at = Self::element(storage.values, slot, storage.value_stride)?;
            let result = self.nested(PathSegment::Key(key.clone()), |de| {
                de.value(value_ty, value_at, member)
            });
            Self::gather(&mut first, result)?;
        }
        first.map_or(Ok(()), Err)
    }

    /// Binary search for the hash of `key`, then a scan forward and backward
    /// through equal hashes for a slot whose key string is unset (or is
    /// `key` already).
    fn map_slot(
        &self,
        def: &TypeDef,
        hashes: &[u32],
        storage: &MapStorage,
        key: &str,
    ) -> Result<usize, DeflateError> {
        let hash = name_hash(key);
        let start = hashes.binary_search(&hash).map_err(|_| self.no_slot(def))?;
        let forward = (start..hashes.len()).take_while(|&i| hashes[i] == hash);
        let backward = (0..start).rev().take_while(|&i| hashes[i] == hash);
        for slot in forward.chain(backward) {
            match self.stored_key(storage, slot)? {
                None => return Ok(slot),
                Some(stored) if stored == key.as_bytes() => return Ok(slot),
                Some(_) => {}
            }
        }
        Err(self.no_slot(def))
    }

    /// The key bytes already written to `slot`, or `None` while it is free.
    fn stored_key(&self, storage: &MapStorage, slot: usize) -> Result<Option<&[u8]>, DeflateError> {
        let at = Self::element(storage.strings, slot, storage.string_stride)?;
        let layout = self.schema.array_layout(&storage.string_def)?;
        let Some(ptr) = self.read_pointer(Self::at(at, layout.ptr)?)? else {
            return Ok(None);
        };
        let len = self.read_uint(Self::at(at, layout.len)?, self.target.pointer_width())?;
        Ok(Some(self.data.slice(ptr, len as usize)?))
    }

    fn no_slot(&self, def: &TypeDef) -> DeflateError {
        SchemaError::Malformed {
            type_name: self.schema.name(def).into(),
            message: "map key hash has no slot".into(),
        }
        .into()
    }
}
