use core::fmt;

/// One of the two ABIs a schema is compiled for.
///
/// The same logical schema produces one [`SchemaContext`](crate::SchemaContext)
/// per target, because pointer and size widths (and therefore every offset
/// downstream of them) differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Target {
    /// 32-bit little-endian guest (WebAssembly linear memory).
    Wasm32 = 0,
    /// The host this code runs on, with its own pointer width and byte order.
    Native = 1,
}

impl Target {
    /// Both targets, in the order they are stored in a container.
    pub const ALL: [Target; 2] = [Target::Wasm32, Target::Native];

    /// Width in bytes of pointers and sizes on this target.
    #[inline]
    pub const fn pointer_width(self) -> u32 {
        match self {
            Target::Wasm32 => 4,
            Target::Native => core::mem::size_of::<usize>() as u32,
        }
    }

    /// Largest value a pointer or size can hold on this target.
    #[inline]
    pub const fn max_pointer(self) -> u64 {
        match self.pointer_width() {
            4 => u32::MAX as u64,
            _ => u64::MAX,
        }
    }

    /// Whether instances for this target are written little-endian.
    #[inline]
    pub const fn is_little_endian(self) -> bool {
        match self {
            Target::Wasm32 => true,
            Target::Native => cfg!(target_endian = "little"),
        }
    }

    /// Short lowercase name, used in logs and generated code.
    pub const fn name(self) -> &'static str {
        match self {
            Target::Wasm32 => "wasm32",
            Target::Native => "native",
        }
    }

    /// Writes the low `out.len()` bytes of `value` in this target's byte order.
    ///
    /// `out` must be at most 8 bytes long.
    pub fn write_uint(self, out: &mut [u8], value: u64) {
        let width = out.len();
        debug_assert!(width <= 8);
        if self.is_little_endian() {
            out.copy_from_slice(&value.to_le_bytes()[..width]);
        } else {
            out.copy_from_slice(&value.to_be_bytes()[8 - width..]);
        }
    }

    /// Reads an unsigned integer of `bytes.len()` bytes in this target's byte order.
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        let width = bytes.len();
        debug_assert!(width <= 8);
        let mut buf = [0u8; 8];
        if self.is_little_endian() {
            buf[..width].copy_from_slice(bytes);
            u64::from_le_bytes(buf)
        } else {
            buf[8 - width..].copy_from_slice(bytes);
            u64::from_be_bytes(buf)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
