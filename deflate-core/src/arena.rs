//! Offset-addressed bump allocator.
//!
//! An [`Arena`] hands out zero-initialized regions addressed by [`Offset`]
//! rather than by pointer, so that what it holds can be persisted, relocated,
//! or laid out for a foreign pointer width. There is no `free`: the whole
//! arena is released at once.

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::{Offset, align_up};

/// Owned buffers are sized in multiples of this, and no allocation may ask
/// for a stricter alignment. Keeping buffer starts on this boundary makes
/// in-buffer alignment and offset alignment the same thing.
pub const MAX_ALIGN: usize = 16;

/// How an owned arena sizes and grows its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Capacity of each buffer, in bytes (rounded up to [`MAX_ALIGN`]).
    pub capacity: usize,
    /// Whether a new buffer is appended when the current one is full.
    pub growable: bool,
}

impl ArenaConfig {
    /// Default buffer capacity for owned arenas.
    pub const DEFAULT_CAPACITY: usize = 64 * 1024;

    /// A single buffer of `capacity` bytes; overflow is an error.
    pub const fn fixed(capacity: usize) -> Self {
        Self {
            capacity,
            growable: false,
        }
    }

    /// Buffers of `capacity` bytes, appended as needed.
    pub const fn growable(capacity: usize) -> Self {
        Self {
            capacity,
            growable: true,
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::growable(Self::DEFAULT_CAPACITY)
    }
}

/// Errors raised by arena allocation and access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// The arena has no backing storage.
    Uninitialized,
    /// The arena wraps read-only bytes.
    ReadOnly,
    /// A fixed or borrowed arena cannot fit the request.
    Exhausted {
        /// Bytes requested.
        requested: usize,
        /// Bytes left in the arena when the request was made.
        available: usize,
    },
    /// The host allocator refused to provide a new buffer.
    HostOutOfMemory {
        /// Size of the buffer that could not be allocated.
        bytes: usize,
    },
    /// The request can never be satisfied: larger than a buffer, or beyond
    /// the 32-bit offset space.
    TooLarge {
        /// Bytes requested.
        requested: usize,
    },
    /// Alignment is zero-free but not a power of two, or above [`MAX_ALIGN`].
    BadAlignment {
        /// The alignment asked for.
        align: usize,
    },
    /// The null offset was dereferenced.
    NullOffset,
    /// A region lies outside the written part of the arena.
    OutOfBounds {
        /// Start of the region.
        offset: Offset,
        /// Length of the region.
        len: usize,
    },
}

impl ArenaError {
    /// Stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            ArenaError::Uninitialized => "arena::uninitialized",
            ArenaError::ReadOnly => "arena::read_only",
            ArenaError::Exhausted { .. } => "arena::exhausted",
            ArenaError::HostOutOfMemory { .. } => "arena::host_out_of_memory",
            ArenaError::TooLarge { .. } => "arena::too_large",
            ArenaError::BadAlignment { .. } => "arena::bad_alignment",
            ArenaError::NullOffset => "arena::null_offset",
            ArenaError::OutOfBounds { .. } => "arena::out_of_bounds",
        }
    }

    /// Whether trying again (with more memory, or later) may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArenaError::Exhausted { .. } | ArenaError::HostOutOfMemory { .. }
        )
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::Uninitialized => write!(f, "arena has no backing storage"),
            ArenaError::ReadOnly => write!(f, "arena is read-only"),
            ArenaError::Exhausted {
                requested,
                available,
            } => write!(
                f,
                "arena exhausted: requested {requested} bytes, {available} available"
            ),
            ArenaError::HostOutOfMemory { bytes } => {
                write!(f, "host allocator failed to provide {bytes} bytes")
            }
            ArenaError::TooLarge { requested } => {
                write!(f, "request of {requested} bytes can never fit in the arena")
            }
            ArenaError::BadAlignment { align } => write!(f, "unsupported alignment {align}"),
            ArenaError::NullOffset => write!(f, "null offset dereferenced"),
            ArenaError::OutOfBounds { offset, len } => {
                write!(f, "region {offset}+{len} is outside the arena")
            }
        }
    }
}

impl core::error::Error for ArenaError {}

enum Storage<'buf> {
    /// Equal-capacity buffers; offset = `index * capacity + in_buffer`.
    Owned {
        chunks: Vec<Box<[u8]>>,
        capacity: usize,
        growable: bool,
    },
    /// Caller-supplied scratch space.
    Borrowed(&'buf mut [u8]),
    /// Bytes loaded from a container; never written.
    ReadOnly(Cow<'buf, [u8]>),
}

/// Offset-addressed bump allocator.
///
/// See the [module documentation](self) for the addressing model.
#[derive(Default)]
pub struct Arena<'buf> {
    storage: Option<Storage<'buf>>,
    /// Offset of the first byte not yet handed out.
    next: usize,
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.storage {
            None => "uninitialized",
            Some(Storage::Owned { growable: true, .. }) => "owned-growable",
            Some(Storage::Owned { .. }) => "owned-fixed",
            Some(Storage::Borrowed(_)) => "borrowed",
            Some(Storage::ReadOnly(_)) => "read-only",
        };
        f.debug_struct("Arena")
            .field("mode", &mode)
            .field("used", &self.next)
            .field("capacity", &self.capacity())
            .finish()
    }
}

fn new_chunk(capacity: usize) -> Result<Box<[u8]>, ArenaError> {
    let mut chunk = Vec::new();
    chunk
        .try_reserve_exact(capacity)
        .map_err(|_| ArenaError::HostOutOfMemory { bytes: capacity })?;
    chunk.resize(capacity, 0);
    Ok(chunk.into_boxed_slice())
}

impl Arena<'static> {
    /// Creates an owned arena with its first buffer allocated.
    pub fn owned(config: ArenaConfig) -> Result<Self, ArenaError> {
        let capacity = align_up(config.capacity.max(MAX_ALIGN), MAX_ALIGN)
            .filter(|&c| c <= u32::MAX as usize)
            .ok_or(ArenaError::TooLarge {
                requested: config.capacity,
            })?;
        let first = new_chunk(capacity)?;
        debug!(capacity, growable = config.growable, "owned arena created");
        Ok(Self {
            storage: Some(Storage::Owned {
                chunks: alloc::vec![first],
                capacity,
                growable: config.growable,
            }),
            next: 1,
        })
    }
}

impl<'buf> Arena<'buf> {
    /// Wraps a caller-supplied buffer for writing. The arena never grows.
    pub fn borrowed(buf: &'buf mut [u8]) -> Self {
        Self {
            storage: Some(Storage::Borrowed(buf)),
            next: 1,
        }
    }

    /// Wraps bytes for reading only; every byte counts as already written.
    pub fn read_only(bytes: impl Into<Cow<'buf, [u8]>>) -> Self {
        let bytes = bytes.into();
        let next = bytes.len();
        Self {
            storage: Some(Storage::ReadOnly(bytes)),
            next,
        }
    }

    /// Whether the arena has backing storage.
    pub fn initialized(&self) -> bool {
        self.storage.is_some()
    }

    /// Whether the arena owns its buffers.
    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Some(Storage::Owned { .. }))
    }

    /// Whether the arena wraps read-only bytes.
    pub fn is_read_only(&self) -> bool {
        matches!(self.storage, Some(Storage::ReadOnly(_)))
    }

    /// Whether allocation may append new buffers.
    pub fn is_growable(&self) -> bool {
        matches!(self.storage, Some(Storage::Owned { growable: true, .. }))
    }

    /// End of the written region: every handed-out offset is below this.
    pub fn used(&self) -> usize {
        self.next
    }

    /// Total bytes of backing storage.
    pub fn capacity(&self) -> usize {
        match &self.storage {
            None => 0,
            Some(Storage::Owned {
                chunks, capacity, ..
            }) => chunks.len() * capacity,
            Some(Storage::Borrowed(buf)) => buf.len(),
            Some(Storage::ReadOnly(bytes)) => bytes.len(),
        }
    }

    /// Host address of offset 0, for arenas backed by a single buffer.
    ///
    /// Owned arenas return `None`: their offset space is not one contiguous
    /// host range.
    pub fn base_address(&self) -> Option<usize> {
        match &self.storage {
            Some(Storage::Borrowed(buf)) => Some(buf.as_ptr() as usize),
            Some(Storage::ReadOnly(bytes)) => Some(bytes.as_ptr() as usize),
            _ => None,
        }
    }

    /// Allocates `size` zeroed bytes aligned to `align`.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<Offset, ArenaError> {
        let align = align.max(1);
        if !align.is_power_of_two() || align > MAX_ALIGN {
            return Err(ArenaError::BadAlignment { align });
        }
        let too_large = ArenaError::TooLarge { requested: size };

        match &mut self.storage {
            None => Err(ArenaError::Uninitialized),
            Some(Storage::ReadOnly(_)) => Err(ArenaError::ReadOnly),
            Some(Storage::Borrowed(buf)) => {
                let start = align_up(self.next, align).ok_or(too_large.clone())?;
                let end = start.checked_add(size).ok_or(too_large.clone())?;
                if end > u32::MAX as usize {
                    return Err(too_large);
                }
                if end > buf.len() {
                    return Err(ArenaError::Exhausted {
                        requested: size,
                        available: buf.len().saturating_sub(self.next),
                    });
                }
                // caller buffers may hold anything
                buf[start..end].fill(0);
                self.next = end;
                Ok(Offset::new(start as u32))
            }
            Some(Storage::Owned {
                chunks,
                capacity,
                growable,
            }) => {
                let capacity = *capacity;
                if size > capacity {
                    return Err(too_large);
                }
                loop {
                    let start = align_up(self.next, align).ok_or(too_large.clone())?;
                    let index = start / capacity;
                    if index < chunks.len() && start + size <= (index + 1) * capacity {
                        self.next = start + size;
                        return Ok(Offset::new(start as u32));
                    }
                    if !*growable {
                        return Err(ArenaError::Exhausted {
                            requested: size,
                            available: (chunks.len() * capacity).saturating_sub(self.next),
                        });
                    }
                    let chunk_start = chunks.len() * capacity;
                    if chunk_start + capacity > u32::MAX as usize {
                        return Err(too_large);
                    }
                    chunks.push(new_chunk(capacity)?);
                    self.next = chunk_start;
                    debug!(chunks = chunks.len(), capacity, "owned arena grew");
                }
            }
        }
    }

    /// Allocates a zeroed array of `count` elements of `elem_size` bytes.
    pub fn alloc_array(
        &mut self,
        count: usize,
        elem_size: usize,
        align: usize,
    ) -> Result<Offset, ArenaError> {
        let size = count
            .checked_mul(elem_size)
            .ok_or(ArenaError::TooLarge {
                requested: usize::MAX,
            })?;
        self.alloc(size, align)
    }

    /// Copies `s` into the arena followed by a NUL terminator.
    pub fn store_str(&mut self, s: &str) -> Result<Offset, ArenaError> {
        let at = self.alloc(s.len() + 1, 1)?;
        self.write(at, s.as_bytes())?;
        trace!(len = s.len(), %at, "stored string");
        Ok(at)
    }

    /// Copies `src` into a fresh allocation aligned to `align`.
    pub fn copy_object(&mut self, src: &[u8], align: usize) -> Result<Offset, ArenaError> {
        let at = self.alloc(src.len(), align)?;
        self.write(at, src)?;
        Ok(at)
    }

    /// The `len` bytes at `offset`, or `None` for the null offset or a region
    /// past the written end.
    pub fn get(&self, offset: Offset, len: usize) -> Option<&[u8]> {
        if offset.is_null() {
            return None;
        }
        let start = offset.as_usize();
        let end = start.checked_add(len)?;
        if end > self.next {
            return None;
        }
        match self.storage.as_ref()? {
            Storage::Owned {
                chunks, capacity, ..
            } => {
                let within = start % capacity;
                if within + len > *capacity {
                    return None;
                }
                chunks.get(start / capacity)?.get(within..within + len)
            }
            Storage::Borrowed(buf) => buf.get(start..end),
            Storage::ReadOnly(bytes) => bytes.get(start..end),
        }
    }

    /// Mutable view of the `len` bytes at `offset`; `None` for read-only
    /// arenas and for the cases [`Arena::get`] rejects.
    pub fn get_mut(&mut self, offset: Offset, len: usize) -> Option<&mut [u8]> {
        if offset.is_null() {
            return None;
        }
        let start = offset.as_usize();
        let end = start.checked_add(len)?;
        if end > self.next {
            return None;
        }
        match self.storage.as_mut()? {
            Storage::Owned {
                chunks, capacity, ..
            } => {
                let within = start % *capacity;
                if within + len > *capacity {
                    return None;
                }
                chunks
                    .get_mut(start / *capacity)?
                    .get_mut(within..within + len)
            }
            Storage::Borrowed(buf) => buf.get_mut(start..end),
            Storage::ReadOnly(_) => None,
        }
    }

    /// Like [`Arena::get`], with an error describing the failure.
    pub fn slice(&self, offset: Offset, len: usize) -> Result<&[u8], ArenaError> {
        self.get(offset, len).ok_or(if offset.is_null() {
            ArenaError::NullOffset
        } else {
            ArenaError::OutOfBounds { offset, len }
        })
    }

    /// Like [`Arena::get_mut`], with an error describing the failure.
    pub fn slice_mut(&mut self, offset: Offset, len: usize) -> Result<&mut [u8], ArenaError> {
        if self.is_read_only() {
            return Err(ArenaError::ReadOnly);
        }
        let err = if offset.is_null() {
            ArenaError::NullOffset
        } else {
            ArenaError::OutOfBounds { offset, len }
        };
        self.get_mut(offset, len).ok_or(err)
    }

    /// Copies `bytes` to `offset`.
    pub fn write(&mut self, offset: Offset, bytes: &[u8]) -> Result<(), ArenaError> {
        self.slice_mut(offset, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Zeroes `len` bytes at `offset`.
    pub fn zero(&mut self, offset: Offset, len: usize) -> Result<(), ArenaError> {
        self.slice_mut(offset, len)?.fill(0);
        Ok(())
    }

    /// Recovers the offset of a slice previously obtained from this arena.
    pub fn offset_of(&self, bytes: &[u8]) -> Option<Offset> {
        let addr = bytes.as_ptr() as usize;
        let contains = |region: &[u8]| {
            let base = region.as_ptr() as usize;
            (addr >= base && addr + bytes.len() <= base + region.len()).then(|| addr - base)
        };
        let pos = match self.storage.as_ref()? {
            Storage::Owned {
                chunks, capacity, ..
            } => chunks
                .iter()
                .enumerate()
                .find_map(|(i, chunk)| contains(chunk).map(|within| i * capacity + within))?,
            Storage::Borrowed(buf) => contains(buf)?,
            Storage::ReadOnly(bytes) => contains(bytes)?,
        };
        Offset::from_usize(pos).and_then(Offset::non_null)
    }

    /// The written region as one contiguous byte vector, starting at offset 0.
    ///
    /// Owned buffers are concatenated whole (except the last), so offsets into
    /// the result equal offsets into the arena.
    pub fn to_vec(&self) -> Vec<u8> {
        match &self.storage {
            None => Vec::new(),
            Some(Storage::Owned {
                chunks, capacity, ..
            }) => {
                let mut out = Vec::with_capacity(self.next);
                let last = chunks.len() - 1;
                for chunk in &chunks[..last] {
                    out.extend_from_slice(chunk);
                }
                out.extend_from_slice(&chunks[last][..self.next - last * capacity]);
                out
            }
            Some(Storage::Borrowed(buf)) => buf[..self.next].to_vec(),
            Some(Storage::ReadOnly(bytes)) => bytes.to_vec(),
        }
    }
}
