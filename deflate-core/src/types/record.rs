//! Fixed-size little-endian records stored in a schema arena.

use crate::{Arena, Offset, SchemaError};

/// A value with a fixed binary encoding inside a schema arena.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Alignment of the record in the arena.
    const ALIGN: usize = 4;

    /// Writes the record; `out` holds exactly [`Record::SIZE`] bytes.
    fn encode(&self, out: &mut RecordWriter<'_>);

    /// Reads the record stored at `at`.
    fn decode(input: &mut RecordReader<'_>, at: Offset) -> Result<Self, SchemaError>;
}

/// Cursor over a record's bytes.
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    /// Starts reading at the beginning of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        b
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(raw)
    }

    /// Reads an offset.
    pub fn offset(&mut self) -> Offset {
        Offset::new(self.u32())
    }

    /// Skips padding.
    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Cursor writing a record's bytes.
pub struct RecordWriter<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> RecordWriter<'a> {
    /// Starts writing at the beginning of `bytes`.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Writes one byte.
    pub fn u8(&mut self, v: u8) {
        self.bytes[self.pos] = v;
        self.pos += 1;
    }

    /// Writes a little-endian `u32`.
    pub fn u32(&mut self, v: u32) {
        self.bytes[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    /// Writes an offset.
    pub fn offset(&mut self, v: Offset) {
        self.u32(v.get());
    }

    /// Writes `n` zero bytes.
    pub fn pad(&mut self, n: usize) {
        self.bytes[self.pos..self.pos + n].fill(0);
        self.pos += n;
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Decodes the record of type `R` stored at `at`.
pub fn read_record<R: Record>(arena: &Arena<'_>, at: Offset) -> Result<R, SchemaError> {
    let bytes = arena
        .get(at, R::SIZE)
        .ok_or(SchemaError::DanglingType { at })?;
    let mut reader = RecordReader::new(bytes);
    let record = R::decode(&mut reader, at)?;
    debug_assert_eq!(reader.position(), R::SIZE);
    Ok(record)
}

/// Encodes `record` at `at`, overwriting what was there.
pub fn write_record<R: Record>(
    arena: &mut Arena<'_>,
    at: Offset,
    record: &R,
) -> Result<(), SchemaError> {
    let bytes = arena.slice_mut(at, R::SIZE)?;
    let mut writer = RecordWriter::new(bytes);
    record.encode(&mut writer);
    debug_assert_eq!(writer.position(), R::SIZE);
    Ok(())
}

/// Allocates room for a record of type `R` and writes it.
pub fn alloc_record<R: Record>(arena: &mut Arena<'_>, record: &R) -> Result<Offset, SchemaError> {
    let at = arena.alloc(R::SIZE, R::ALIGN)?;
    write_record(arena, at, record)?;
    Ok(at)
}
