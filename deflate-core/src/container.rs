//! The binary container a compiled schema is persisted in.
//!
//! ```text
//! header    magic: u16, version: u8, reserved: u8
//! metadata  schema_hash: u32
//! context   wasm32   (SchemaContext::ENCODED_SIZE bytes)
//! context   native   (SchemaContext::ENCODED_SIZE bytes)
//! arena     schema arena bytes, starting at offset 0
//! ```
//!
//! Every integer is little-endian. Changing anything above requires bumping
//! [`VERSION`].

use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::fmt;
use std::io;

use crate::{Arena, Schema, SchemaContext, SchemaError, Target};

/// First two bytes of every container.
pub const MAGIC: u16 = 0xDEF1;

/// The only format version this crate reads and writes.
pub const VERSION: u8 = 1;

const HEADER_SIZE: usize = 4;
const METADATA_SIZE: usize = 4;

/// Bytes preceding the arena.
pub const PREAMBLE_SIZE: usize = HEADER_SIZE + METADATA_SIZE + 2 * SchemaContext::ENCODED_SIZE;

/// Container metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Hash of the layouts the schema produces; consumers compare it with the
    /// hash their own type declarations were generated with.
    pub schema_hash: u32,
}

/// Errors raised reading or writing a container.
#[derive(Debug)]
pub enum ContainerError {
    /// The input does not start with [`MAGIC`].
    BadMagic {
        /// The two bytes found instead.
        found: u16,
    },
    /// The input was written by an unknown format version.
    UnsupportedVersion {
        /// The version found.
        found: u8,
    },
    /// The input ends before the preamble does.
    Truncated {
        /// Bytes available.
        len: usize,
    },
    /// Only schemas built in an owned arena can be written.
    BorrowedArena,
    /// Reading or writing the underlying stream failed.
    Io(io::Error),
    /// A context could not be decoded.
    Schema(SchemaError),
}

impl ContainerError {
    /// Stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            ContainerError::BadMagic { .. } => "container::bad_magic",
            ContainerError::UnsupportedVersion { .. } => "container::unsupported_version",
            ContainerError::Truncated { .. } => "container::truncated",
            ContainerError::BorrowedArena => "container::borrowed_arena",
            ContainerError::Io(_) => "container::io",
            ContainerError::Schema(_) => "container::schema",
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::BadMagic { found } => {
                write!(f, "not a schema container (magic {found:#06x})")
            }
            ContainerError::UnsupportedVersion { found } => {
                write!(f, "unsupported container version {found} (expected {VERSION})")
            }
            ContainerError::Truncated { len } => {
                write!(f, "container truncated: {len} bytes, at least {PREAMBLE_SIZE} needed")
            }
            ContainerError::BorrowedArena => {
                write!(f, "only schemas built in an owned arena can be written")
            }
            ContainerError::Io(e) => write!(f, "container I/O: {e}"),
            ContainerError::Schema(e) => write!(f, "container: {e}"),
        }
    }
}

impl core::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            ContainerError::Io(e) => Some(e),
            ContainerError::Schema(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ContainerError {
    fn from(e: io::Error) -> Self {
        ContainerError::Io(e)
    }
}

impl From<SchemaError> for ContainerError {
    fn from(e: SchemaError) -> Self {
        ContainerError::Schema(e)
    }
}

/// A compiled schema: both target contexts and the arena their types live in.
#[derive(Debug)]
pub struct Container<'a> {
    /// Container metadata.
    pub metadata: Metadata,
    /// Context for [`Target::Wasm32`].
    pub wasm: SchemaContext,
    /// Context for [`Target::Native`].
    pub native: SchemaContext,
    /// The schema arena.
    pub arena: Arena<'a>,
}

impl<'a> Container<'a> {
    /// Read access to the schema types.
    pub fn schema(&self) -> Schema<'_> {
        Schema::new(&self.arena)
    }

    /// The context compiled for `target`.
    pub fn context(&self, target: Target) -> &SchemaContext {
        match target {
            Target::Wasm32 => &self.wasm,
            Target::Native => &self.native,
        }
    }

    /// Parses a container held in memory. The arena borrows `bytes`.
    pub fn read(bytes: &'a [u8]) -> Result<Self, ContainerError> {
        let (metadata, wasm, native) = read_preamble(bytes)?;
        let arena = Arena::read_only(&bytes[PREAMBLE_SIZE..]);
        debug!(
            schema_hash = metadata.schema_hash,
            arena = arena.used(),
            "container read"
        );
        Ok(Self {
            metadata,
            wasm,
            native,
            arena,
        })
    }

    /// Writes the container to `out`.
    pub fn write(&self, mut out: impl io::Write) -> Result<(), ContainerError> {
        if !self.arena.is_owned() {
            return Err(ContainerError::BorrowedArena);
        }
        out.write_all(&MAGIC.to_le_bytes())?;
        out.write_all(&[VERSION, 0])?;
        out.write_all(&self.metadata.schema_hash.to_le_bytes())?;
        out.write_all(&self.wasm.to_bytes())?;
        out.write_all(&self.native.to_bytes())?;
        out.write_all(&self.arena.to_vec())?;
        debug!(
            schema_hash = self.metadata.schema_hash,
            arena = self.arena.used(),
            "container written"
        );
        Ok(())
    }

    /// The container as one byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        let mut out = Vec::with_capacity(PREAMBLE_SIZE + self.arena.used());
        self.write(&mut out)?;
        Ok(out)
    }
}

impl Container<'static> {
    /// Reads a container from a stream into memory the container owns.
    pub fn read_from(mut input: impl io::Read) -> Result<Self, ContainerError> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        let (metadata, wasm, native) = read_preamble(&bytes)?;
        bytes.drain(..PREAMBLE_SIZE);
        let arena = Arena::read_only(Cow::Owned(bytes));
        debug!(
            schema_hash = metadata.schema_hash,
            arena = arena.used(),
            "container loaded"
        );
        Ok(Self {
            metadata,
            wasm,
            native,
            arena,
        })
    }
}

fn read_preamble(bytes: &[u8]) -> Result<(Metadata, SchemaContext, SchemaContext), ContainerError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ContainerError::Truncated { len: bytes.len() });
    }
    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    if magic != MAGIC {
        return Err(ContainerError::BadMagic { found: magic });
    }
    if bytes[2] != VERSION {
        return Err(ContainerError::UnsupportedVersion { found: bytes[2] });
    }
    if bytes.len() < PREAMBLE_SIZE {
        return Err(ContainerError::Truncated { len: bytes.len() });
    }

    let mut hash = [0u8; 4];
    hash.copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + METADATA_SIZE]);
    let metadata = Metadata {
        schema_hash: u32::from_le_bytes(hash),
    };

    let mut raw = [0u8; SchemaContext::ENCODED_SIZE];
    let mut at = HEADER_SIZE + METADATA_SIZE;
    raw.copy_from_slice(&bytes[at..at + SchemaContext::ENCODED_SIZE]);
    let wasm = SchemaContext::from_bytes(&raw)?;
    at += SchemaContext::ENCODED_SIZE;
    raw.copy_from_slice(&bytes[at..at + SchemaContext::ENCODED_SIZE]);
    let native = SchemaContext::from_bytes(&raw)?;
    Ok((metadata, wasm, native))
}
